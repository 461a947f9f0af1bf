//! Per-species tuning and behaviour hooks.
//!
//! Species are a closed set dispatched through a static [`SpeciesProfile`]
//! table plus a few small `match`-based hooks deciding which branch states a
//! species uses.

use serde::{Deserialize, Serialize};

use super::state::PredatorState;

/// Raptor species available to the predator AI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// Generalist that stalks, hunts and attacks.
    #[default]
    Hawk,
    /// Climbs above its target, then stoops in a high-speed dive.
    Falcon,
    /// Waits nearly motionless and strikes prey that wander close.
    Owl,
    /// Patrols in wide circles while looking for prey.
    Eagle,
    /// Hunts in packs, herding the flock and taking turns to attack.
    HarrisHawk,
}

/// Relative importance of each target-scoring factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringWeights {
    pub isolation: f32,
    pub edge: f32,
    pub low_relative_velocity: f32,
    pub panic: f32,
    pub intercept: f32,
    pub exhaustion: f32,
}

impl ScoringWeights {
    #[inline]
    pub fn total(&self) -> f32 {
        self.isolation + self.edge + self.low_relative_velocity + self.panic + self.intercept + self.exhaustion
    }
}

/// Static tuning for one species.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeciesProfile {
    /// Top speed in world units per second, before burst.
    pub max_speed: f32,
    /// Speed floor while airborne. Ignored by hovering states.
    pub cruise_speed: f32,
    /// Turn rate in radians per second at zero speed.
    pub agility: f32,
    /// Acceleration toward the desired speed, per second.
    pub acceleration: f32,
    /// Drag coefficient per second at top speed.
    pub drag: f32,
    /// Drag multiplier while coasting.
    pub glide_multiplier: f32,
    /// Speed multiplier while diving or attacking.
    pub burst_multiplier: f32,
    /// Distance from the edges where soft repulsion starts.
    pub boundary_margin: f32,
    /// Energy lost per second at full effort.
    pub energy_drain: f32,
    /// Energy regained per second while resting.
    pub energy_regen: f32,
    /// Below this energy the predator must recover.
    pub exhaustion_threshold: f32,
    /// Recovering only ends once energy is back above this.
    pub recovery_threshold: f32,
    /// Seconds spent idle before scanning again.
    pub idle_duration: f32,
    /// Seconds spent scanning before giving up and idling.
    pub scan_duration: f32,
    /// Stalking turns into hunting after this long.
    pub stalk_duration: f32,
    /// A chase is abandoned after this long.
    pub hunt_duration: f32,
    /// An attack resolves as a miss after this long.
    pub attack_duration: f32,
    /// Minimum time spent recovering.
    pub recovery_duration: f32,
    /// Branch state duration: climb, ambush wait or herding.
    pub branch_duration: f32,
    pub weights: ScoringWeights,
}

const HAWK: SpeciesProfile = SpeciesProfile {
    max_speed: 190.0,
    cruise_speed: 50.0,
    agility: 4.0,
    acceleration: 2.5,
    drag: 0.4,
    glide_multiplier: 0.5,
    burst_multiplier: 1.4,
    boundary_margin: 100.0,
    energy_drain: 0.12,
    energy_regen: 0.08,
    exhaustion_threshold: 0.2,
    recovery_threshold: 0.6,
    idle_duration: 2.0,
    scan_duration: 8.0,
    stalk_duration: 4.0,
    hunt_duration: 6.0,
    attack_duration: 1.5,
    recovery_duration: 3.0,
    branch_duration: 0.0,
    weights: ScoringWeights {
        isolation: 1.0,
        edge: 0.5,
        low_relative_velocity: 0.5,
        panic: 0.5,
        intercept: 1.0,
        exhaustion: 0.5,
    },
};

const FALCON: SpeciesProfile = SpeciesProfile {
    max_speed: 220.0,
    cruise_speed: 60.0,
    agility: 3.0,
    acceleration: 2.0,
    drag: 0.3,
    glide_multiplier: 0.4,
    burst_multiplier: 1.8,
    boundary_margin: 120.0,
    energy_drain: 0.15,
    energy_regen: 0.07,
    exhaustion_threshold: 0.2,
    recovery_threshold: 0.65,
    idle_duration: 2.5,
    scan_duration: 10.0,
    stalk_duration: 3.0,
    hunt_duration: 4.0,
    attack_duration: 1.0,
    recovery_duration: 4.0,
    branch_duration: 2.0,
    weights: ScoringWeights {
        isolation: 1.0,
        edge: 0.2,
        low_relative_velocity: 0.3,
        panic: 0.3,
        intercept: 1.5,
        exhaustion: 0.3,
    },
};

const OWL: SpeciesProfile = SpeciesProfile {
    max_speed: 150.0,
    cruise_speed: 35.0,
    agility: 5.0,
    acceleration: 3.0,
    drag: 0.6,
    glide_multiplier: 0.3,
    burst_multiplier: 1.5,
    boundary_margin: 80.0,
    energy_drain: 0.1,
    energy_regen: 0.1,
    exhaustion_threshold: 0.15,
    recovery_threshold: 0.5,
    idle_duration: 3.0,
    scan_duration: 10.0,
    stalk_duration: 5.0,
    hunt_duration: 3.0,
    attack_duration: 1.2,
    recovery_duration: 3.0,
    branch_duration: 8.0,
    weights: ScoringWeights {
        isolation: 0.8,
        edge: 0.3,
        low_relative_velocity: 1.0,
        panic: 0.2,
        intercept: 0.8,
        exhaustion: 0.4,
    },
};

const EAGLE: SpeciesProfile = SpeciesProfile {
    max_speed: 170.0,
    cruise_speed: 55.0,
    agility: 2.5,
    acceleration: 1.5,
    drag: 0.3,
    glide_multiplier: 0.3,
    burst_multiplier: 1.5,
    boundary_margin: 140.0,
    energy_drain: 0.1,
    energy_regen: 0.06,
    exhaustion_threshold: 0.25,
    recovery_threshold: 0.7,
    idle_duration: 3.0,
    scan_duration: 12.0,
    stalk_duration: 4.0,
    hunt_duration: 7.0,
    attack_duration: 1.5,
    recovery_duration: 5.0,
    branch_duration: 0.0,
    weights: ScoringWeights {
        isolation: 1.5,
        edge: 0.8,
        low_relative_velocity: 0.3,
        panic: 0.4,
        intercept: 0.8,
        exhaustion: 0.8,
    },
};

const HARRIS_HAWK: SpeciesProfile = SpeciesProfile {
    max_speed: 180.0,
    cruise_speed: 50.0,
    agility: 4.5,
    acceleration: 2.5,
    drag: 0.4,
    glide_multiplier: 0.5,
    burst_multiplier: 1.4,
    boundary_margin: 100.0,
    energy_drain: 0.1,
    energy_regen: 0.09,
    exhaustion_threshold: 0.2,
    recovery_threshold: 0.6,
    idle_duration: 1.5,
    scan_duration: 8.0,
    stalk_duration: 3.0,
    hunt_duration: 5.0,
    attack_duration: 1.5,
    recovery_duration: 3.0,
    branch_duration: 3.0,
    weights: ScoringWeights {
        isolation: 0.7,
        edge: 1.0,
        low_relative_velocity: 0.5,
        panic: 0.8,
        intercept: 0.8,
        exhaustion: 0.5,
    },
};

impl Species {
    pub const ALL: [Species; 5] =
        [Species::Hawk, Species::Falcon, Species::Owl, Species::Eagle, Species::HarrisHawk];

    /// Tuning table entry for this species.
    pub fn profile(self) -> &'static SpeciesProfile {
        match self {
            Species::Hawk => &HAWK,
            Species::Falcon => &FALCON,
            Species::Owl => &OWL,
            Species::Eagle => &EAGLE,
            Species::HarrisHawk => &HARRIS_HAWK,
        }
    }

    /// State used while looking for prey.
    pub fn search_state(self) -> PredatorState {
        match self {
            Species::Eagle => PredatorState::Circling,
            _ => PredatorState::Scanning,
        }
    }

    /// State entered once a target has been acquired.
    pub fn pursuit_state(self) -> PredatorState {
        match self {
            Species::Falcon => PredatorState::Ascending,
            Species::Owl => PredatorState::Ambushing,
            Species::HarrisHawk => PredatorState::Herding,
            Species::Hawk | Species::Eagle => PredatorState::Stalking,
        }
    }

    /// Whether the species relies on a pack coordinator.
    pub fn hunts_in_packs(self) -> bool {
        matches!(self, Species::HarrisHawk)
    }

    /// Whether the species may drop below its cruise speed.
    pub fn can_hover(self, state: PredatorState) -> bool {
        matches!((self, state), (Species::Owl, PredatorState::Ambushing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_consistent() {
        for species in Species::ALL {
            let p = species.profile();
            assert!(p.cruise_speed < p.max_speed, "{species:?}");
            assert!(p.recovery_threshold > p.exhaustion_threshold, "{species:?}");
            assert!(p.burst_multiplier >= 1.0, "{species:?}");
            assert!(p.weights.total() > 0.0, "{species:?}");
        }
    }

    #[test]
    fn test_branch_states() {
        assert_eq!(Species::Falcon.pursuit_state(), PredatorState::Ascending);
        assert_eq!(Species::Owl.pursuit_state(), PredatorState::Ambushing);
        assert_eq!(Species::Eagle.search_state(), PredatorState::Circling);
        assert_eq!(Species::HarrisHawk.pursuit_state(), PredatorState::Herding);
        assert!(Species::Owl.can_hover(PredatorState::Ambushing));
        assert!(!Species::Hawk.can_hover(PredatorState::Ambushing));
    }
}
