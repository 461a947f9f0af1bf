//! Pack coordination for cooperative hunters.
//!
//! Pack species only talk to a [`PackCoordinator`]; any strategy for
//! assigning sectors or arbitrating the single attack slot can be plugged in.
//! [`PackRoster`] is a simple implementation that spreads members evenly
//! around the target, starting from the pack's side, and hands the slot to
//! the first claimant.

use std::f32::consts::TAU;

use glam::Vec2;

/// Narrow interface pack-hunting predators depend on.
pub trait PackCoordinator: Send {
    /// Called once per tick with every pack member's id and position.
    fn refresh(&mut self, _members: &[(u32, Vec2)]) {}

    /// Centre of the pack, if it has any members.
    fn pack_center(&self) -> Option<Vec2>;

    /// Bearing offset in radians assigned to `predator`. Herders hold
    /// station around the target at this offset from the direction of the
    /// pack centre.
    fn assigned_sector(&self, predator: u32) -> Option<f32>;

    /// Whether nobody holds the attack slot.
    fn attack_slot_available(&self) -> bool;

    /// Try to take the attack slot. Returns true if `predator` now holds it.
    fn claim_attack_slot(&mut self, predator: u32) -> bool;

    /// Give the slot back. Ignored unless `predator` holds it.
    fn release_attack_slot(&mut self, predator: u32);
}

/// Evenly spaced sectors and a single first-come attack slot.
#[derive(Clone, Debug, Default)]
pub struct PackRoster {
    members: Vec<(u32, Vec2)>,
    slot_holder: Option<u32>,
}

impl PackRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[(u32, Vec2)] {
        &self.members
    }

    pub fn slot_holder(&self) -> Option<u32> {
        self.slot_holder
    }
}

impl PackCoordinator for PackRoster {
    fn refresh(&mut self, members: &[(u32, Vec2)]) {
        self.members.clear();
        self.members.extend_from_slice(members);
        self.members.sort_by_key(|&(id, _)| id);
        if let Some(holder) = self.slot_holder {
            if !self.members.iter().any(|&(id, _)| id == holder) {
                self.slot_holder = None;
            }
        }
    }

    fn pack_center(&self) -> Option<Vec2> {
        if self.members.is_empty() {
            return None;
        }
        let sum = self.members.iter().fold(Vec2::ZERO, |acc, &(_, p)| acc + p);
        Some(sum / self.members.len() as f32)
    }

    fn assigned_sector(&self, predator: u32) -> Option<f32> {
        let rank = self.members.iter().position(|&(id, _)| id == predator)?;
        Some(TAU * rank as f32 / self.members.len() as f32)
    }

    fn attack_slot_available(&self) -> bool {
        self.slot_holder.is_none()
    }

    fn claim_attack_slot(&mut self, predator: u32) -> bool {
        match self.slot_holder {
            None => {
                self.slot_holder = Some(predator);
                true
            }
            Some(holder) => holder == predator,
        }
    }

    fn release_attack_slot(&mut self, predator: u32) {
        if self.slot_holder == Some(predator) {
            self.slot_holder = None;
        }
    }
}
