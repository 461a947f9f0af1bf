//! Predator FSM states and their static properties.

use serde::{Deserialize, Serialize};

/// Effective panic radius scale while a predator moves silently.
pub const SILENT_RADIUS_FACTOR: f32 = 0.3;

/// Hunting state of a predator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredatorState {
    #[default]
    Idle,
    Scanning,
    Stalking,
    Hunting,
    Attacking,
    Recovering,
    Diving,
    Ambushing,
    Ascending,
    Circling,
    Herding,
}

impl PredatorState {
    /// Silent states broadcast panic over a reduced radius.
    #[inline]
    pub fn is_silent(self) -> bool {
        matches!(self, PredatorState::Stalking | PredatorState::Ambushing | PredatorState::Circling)
    }

    #[inline]
    pub fn regenerates(self) -> bool {
        matches!(
            self,
            PredatorState::Idle | PredatorState::Scanning | PredatorState::Circling | PredatorState::Recovering
        )
    }

    #[inline]
    pub fn drains(self) -> bool {
        matches!(self, PredatorState::Hunting | PredatorState::Attacking | PredatorState::Diving)
    }

    /// States that may use the burst multiplier.
    #[inline]
    pub fn bursts(self) -> bool {
        matches!(self, PredatorState::Diving | PredatorState::Attacking)
    }

    /// States that hold a target reference.
    #[inline]
    pub fn needs_target(self) -> bool {
        matches!(
            self,
            PredatorState::Stalking
                | PredatorState::Hunting
                | PredatorState::Attacking
                | PredatorState::Diving
                | PredatorState::Ambushing
                | PredatorState::Ascending
                | PredatorState::Herding
        )
    }

    /// Strength of the panic this state broadcasts to nearby prey.
    pub fn panic_strength(self) -> f32 {
        match self {
            PredatorState::Idle | PredatorState::Recovering => 0.0,
            PredatorState::Circling | PredatorState::Ambushing => 0.05,
            PredatorState::Scanning | PredatorState::Stalking => 0.1,
            PredatorState::Ascending => 0.15,
            PredatorState::Herding => 0.4,
            PredatorState::Hunting => 0.6,
            PredatorState::Diving => 0.8,
            PredatorState::Attacking => 1.0,
        }
    }

    /// Multiplier on the base panic radius.
    #[inline]
    pub fn radius_factor(self) -> f32 {
        if self.is_silent() {
            SILENT_RADIUS_FACTOR
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_states() {
        assert!(PredatorState::Stalking.is_silent());
        assert!(PredatorState::Ambushing.is_silent());
        assert!(PredatorState::Circling.is_silent());
        assert!(!PredatorState::Hunting.is_silent());
        assert_eq!(PredatorState::Circling.radius_factor(), SILENT_RADIUS_FACTOR);
    }

    #[test]
    fn test_energy_sets_are_disjoint() {
        let all = [
            PredatorState::Idle,
            PredatorState::Scanning,
            PredatorState::Stalking,
            PredatorState::Hunting,
            PredatorState::Attacking,
            PredatorState::Recovering,
            PredatorState::Diving,
            PredatorState::Ambushing,
            PredatorState::Ascending,
            PredatorState::Circling,
            PredatorState::Herding,
        ];
        for s in all {
            assert!(!(s.regenerates() && s.drains()), "{s:?}");
            assert!((0.0..=1.0).contains(&s.panic_strength()));
        }
    }
}
