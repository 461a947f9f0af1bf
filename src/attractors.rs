//! Externally driven point forces.
//!
//! User input (a click, a drag) places an [`Attractor`] that pulls agents
//! toward it, or pushes them away when flagged as a repulsor. The pull falls
//! off linearly to zero at `radius`, and the attractor expires once its
//! lifetime runs out.

use glam::Vec2;

use crate::forces::MIN_DISTANCE;

/// A temporary point of attraction or repulsion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attractor {
    pub position: Vec2,
    pub strength: f32,
    pub radius: f32,
    /// Remaining lifetime in seconds. `f32::INFINITY` never expires.
    pub lifetime: f32,
    pub repulsor: bool,
}

impl Attractor {
    pub fn attract(position: Vec2, strength: f32, radius: f32, lifetime: f32) -> Self {
        Self { position, strength, radius, lifetime, repulsor: false }
    }

    pub fn repel(position: Vec2, strength: f32, radius: f32, lifetime: f32) -> Self {
        Self { position, strength, radius, lifetime, repulsor: true }
    }

    /// Strength with the repulsor sign folded in.
    #[inline]
    pub fn signed_strength(&self) -> f32 {
        if self.repulsor {
            -self.strength
        } else {
            self.strength
        }
    }

    /// Force this attractor exerts on an agent at `at`.
    #[inline]
    pub fn force_at(&self, at: Vec2) -> Vec2 {
        let offset = self.position - at;
        let d = offset.length();
        if d <= MIN_DISTANCE || d >= self.radius {
            return Vec2::ZERO;
        }
        offset / d * self.signed_strength() * (1.0 - d / self.radius)
    }

    pub fn is_expired(&self) -> bool {
        self.lifetime <= 0.0
    }
}

/// Sum of every attractor's force at `at`.
pub fn attraction(at: Vec2, attractors: &[Attractor]) -> Vec2 {
    attractors.iter().fold(Vec2::ZERO, |acc, a| acc + a.force_at(at))
}

/// Age every attractor by `dt` and drop the expired ones.
pub fn age(attractors: &mut Vec<Attractor>, dt: f32) {
    for a in attractors.iter_mut() {
        a.lifetime -= dt;
    }
    attractors.retain(|a| !a.is_expired());
}
