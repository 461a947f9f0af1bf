//! Predator flight model.
//!
//! Predators do not steer like prey. They hold a heading that can only turn
//! at an agility-limited rate (slower at speed, giving a turn radius), and a
//! scalar speed that accelerates toward the desired speed, bleeds off through
//! drag and never drops below cruise speed unless the species can hover.

use std::f32::consts::{PI, TAU};

use glam::Vec2;

use super::species::{Species, SpeciesProfile};
use super::state::PredatorState;
use crate::step::{EDGE_PADDING, WALL_RESTITUTION};

/// Fraction of the acceleration rate used when slowing down.
const BRAKE_FACTOR: f32 = 0.5;

/// Wrap an angle into `[-PI, PI)`.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Inward push for a predator inside its boundary margin.
pub fn soft_boundary(position: Vec2, world: Vec2, margin: f32, strength: f32) -> Vec2 {
    if margin <= 0.0 {
        return Vec2::ZERO;
    }
    let ramp = |d: f32| (1.0 - d / margin).clamp(0.0, 1.0);
    Vec2::new(
        ramp(position.x) - ramp(world.x - position.x),
        ramp(position.y) - ramp(world.y - position.y),
    ) * strength
}

/// Kinematic state of one predator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Flight {
    pub position: Vec2,
    pub velocity: Vec2,
    pub heading: f32,
}

/// Fly for `dt` seconds toward `desired` velocity.
pub fn fly(
    flight: Flight,
    desired: Vec2,
    species: Species,
    state: PredatorState,
    world: Vec2,
    dt: f32,
) -> Flight {
    let profile: &SpeciesProfile = species.profile();
    let top = profile.max_speed * if state.bursts() { profile.burst_multiplier } else { 1.0 };

    let desired = desired + soft_boundary(flight.position, world, profile.boundary_margin, profile.max_speed);
    let target_speed = desired.length().min(top);
    let mut speed = flight.velocity.length();

    let mut heading = flight.heading;
    if target_speed > 1e-3 {
        let speed_ratio = (speed / profile.max_speed).min(1.0);
        let max_turn = profile.agility * (1.0 - 0.5 * speed_ratio) * dt;
        let want = desired.y.atan2(desired.x);
        heading = wrap_angle(heading + wrap_angle(want - heading).clamp(-max_turn, max_turn));
    }

    let thrusting = target_speed > speed;
    let rate = (profile.acceleration * dt).min(1.0);
    speed += if thrusting { (target_speed - speed) * rate } else { (target_speed - speed) * rate * BRAKE_FACTOR };

    let glide = if thrusting { 1.0 } else { profile.glide_multiplier };
    let drag = profile.drag * (speed / profile.max_speed) * glide;
    speed *= (1.0 - drag * dt).max(0.0);

    let floor = if species.can_hover(state) { 0.0 } else { profile.cruise_speed };
    speed = speed.clamp(floor.min(top), top);

    let mut velocity = Vec2::from_angle(heading) * speed;
    let mut position = flight.position + velocity * dt;

    let lo = Vec2::splat(EDGE_PADDING);
    let hi = (world - lo).max(lo);
    let mut bounced = false;
    if position.x < lo.x || position.x > hi.x {
        position.x = position.x.clamp(lo.x, hi.x);
        velocity.x = -velocity.x * WALL_RESTITUTION;
        bounced = true;
    }
    if position.y < lo.y || position.y > hi.y {
        position.y = position.y.clamp(lo.y, hi.y);
        velocity.y = -velocity.y * WALL_RESTITUTION;
        bounced = true;
    }
    if bounced && velocity.length() > 1e-3 {
        heading = velocity.y.atan2(velocity.x);
    }

    Flight { position, velocity, heading }
}
