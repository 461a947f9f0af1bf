//! Predator AI.
//!
//! Each [`Predator`] runs a finite-state machine over [`PredatorState`]:
//!
//! ```text
//! idle -> scanning -> stalking -> hunting -> attacking -> recovering -> idle
//! ```
//!
//! Species swap in branch states: falcons climb (`ascending`) and stoop
//! (`diving`), owls wait in `ambushing`, eagles search while `circling`,
//! and Harris's hawks `herd` the flock before taking the pack's attack slot.
//!
//! Every state has an entry action ([`Predator::enter`]), a per-tick update
//! that yields a desired velocity, and transition rules keyed off state time,
//! energy and distance to target relative to the panic radius. Falling below
//! the exhaustion threshold forces `recovering` from any state.
//!
//! Targets are non-owning [`TargetRef`]s revalidated every tick against the
//! serial stamped on the store row; a stale reference sends the predator back
//! to searching.
//!
//! Predators run after the prey step, read the freshly written store and
//! raise prey panic around themselves.

pub mod pack;
pub mod physics;
pub mod species;
pub mod state;

pub use pack::{PackCoordinator, PackRoster};
pub use species::{ScoringWeights, Species, SpeciesProfile};
pub use state::{PredatorState, SILENT_RADIUS_FACTOR};

use glam::Vec2;
use rand::{rngs::SmallRng, Rng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SimulationConfig;
use crate::forces::{wall_distance, Threat, MIN_DISTANCE};
use crate::spatial::SpatialGrid;
use crate::store::AgentStore;
use physics::Flight;

/// Candidates scoring below this are never chosen as targets.
pub const MIN_TARGET_SCORE: f32 = 0.3;
/// Targets are searched within this multiple of the panic radius.
pub const SCAN_RADIUS_FACTOR: f32 = 2.0;
/// A chase turns into an attack inside this fraction of the panic radius.
pub const ATTACK_RANGE_FACTOR: f32 = 0.25;
/// Ambushers strike prey inside this fraction of the panic radius.
pub const AMBUSH_TRIGGER_FACTOR: f32 = 0.5;
/// A chase is lost beyond this multiple of the panic radius.
pub const LOSE_TARGET_FACTOR: f32 = 3.0;
/// Distance at which an attack connects.
pub const STRIKE_DISTANCE: f32 = 10.0;
/// Distance from a wall over which edge proximity scores.
pub const EDGE_SCORE_RANGE: f32 = 150.0;
/// Energy a caught prey loses.
pub const CATCH_ENERGY_LOSS: f32 = 0.5;
/// Energy a predator gains from a catch.
pub const MEAL_ENERGY: f32 = 0.3;
/// Panic burst radius around a catch, as a multiple of the panic radius.
pub const CATCH_PANIC_RADIUS_FACTOR: f32 = 1.5;
pub const ATTACK_PROBABILITY_FLOOR: f32 = 0.2;
pub const ATTACK_PROBABILITY_CEILING: f32 = 0.95;

/// Non-owning reference to a prey agent, checked against the row serial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetRef {
    pub index: usize,
    pub serial: u64,
    /// Where the target was last seen.
    pub last_position: Vec2,
}

impl TargetRef {
    pub fn new(index: usize, store: &AgentStore) -> Option<Self> {
        let serial = store.serial(index)?;
        Some(Self { index, serial, last_position: store.positions()[index] })
    }

    /// The referenced index if it still names the same agent.
    #[inline]
    pub fn resolve(&self, store: &AgentStore) -> Option<usize> {
        (store.serial(self.index) == Some(self.serial)).then_some(self.index)
    }
}

/// Attack outcomes for one predator, or summed over all of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntStats {
    /// Attacks launched. Each ends in exactly one success or failure.
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// Chases or dives abandoned before an attack was launched.
    pub timeouts: u32,
}

impl HuntStats {
    pub fn success_rate(&self) -> f32 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f32 / self.attempts as f32
        }
    }
}

impl std::ops::Add for HuntStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            attempts: self.attempts + rhs.attempts,
            successes: self.successes + rhs.successes,
            failures: self.failures + rhs.failures,
            timeouts: self.timeouts + rhs.timeouts,
        }
    }
}

/// Inputs to target scoring, each normalised to `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TargetFactors {
    pub isolation: f32,
    pub edge: f32,
    pub low_relative_velocity: f32,
    pub panic: f32,
    pub intercept: f32,
    pub exhaustion: f32,
}

/// Weighted mean of the factors, in `[0, 1]`.
pub fn score_target(weights: &ScoringWeights, f: &TargetFactors) -> f32 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    (weights.isolation * f.isolation
        + weights.edge * f.edge
        + weights.low_relative_velocity * f.low_relative_velocity
        + weights.panic * f.panic
        + weights.intercept * f.intercept
        + weights.exhaustion * f.exhaustion)
        / total
}

/// Chance an attack connects.
///
/// Tired, calm (surprised), isolated prey approached fast are easiest.
/// `approach` is the predator's speed as a fraction of its burst top speed.
pub fn attack_success_probability(target_energy: f32, target_panic: f32, target_density: f32, approach: f32) -> f32 {
    let p = 0.05
        + 0.30 * (1.0 - target_energy.clamp(0.0, 1.0))
        + 0.20 * (1.0 - target_panic.clamp(0.0, 1.0))
        + 0.25 * (1.0 - target_density.clamp(0.0, 1.0))
        + 0.25 * approach.clamp(0.0, 1.0);
    p.clamp(ATTACK_PROBABILITY_FLOOR, ATTACK_PROBABILITY_CEILING)
}

/// Everything a predator touches during its update.
pub struct PredatorContext<'a> {
    pub store: &'a mut AgentStore,
    /// Grid built from the store's current positions.
    pub grid: &'a SpatialGrid,
    pub sim: &'a SimulationConfig,
    pub world: Vec2,
    pub panic_radius: f32,
    pub dt: f32,
    pub rng: &'a mut SmallRng,
    pub pack: Option<&'a mut (dyn PackCoordinator + 'static)>,
}

/// One raptor.
#[derive(Clone, Debug)]
pub struct Predator {
    id: u32,
    species: Species,
    position: Vec2,
    velocity: Vec2,
    heading: f32,
    state: PredatorState,
    state_time: f32,
    energy: f32,
    panic_radius: f32,
    target: Option<TargetRef>,
    attack_roll: bool,
    /// An attack was launched and has not been scored yet.
    attack_pending: bool,
    orbit_center: Vec2,
    stats: HuntStats,
}

impl Predator {
    pub fn new(id: u32, species: Species, position: Vec2, panic_radius: f32) -> Self {
        Self {
            id,
            species,
            position,
            velocity: Vec2::new(species.profile().cruise_speed, 0.0),
            heading: 0.0,
            state: PredatorState::Idle,
            state_time: 0.0,
            energy: 1.0,
            panic_radius,
            target: None,
            attack_roll: false,
            attack_pending: false,
            orbit_center: position,
            stats: HuntStats::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn state(&self) -> PredatorState {
        self.state
    }

    /// Seconds spent in the current state.
    pub fn state_time(&self) -> f32 {
        self.state_time
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn set_energy(&mut self, energy: f32) {
        self.energy = energy.clamp(0.0, 1.0);
    }

    /// Base panic radius.
    pub fn panic_radius(&self) -> f32 {
        self.panic_radius
    }

    /// Panic radius prey actually feel, reduced while silent.
    pub fn effective_panic_radius(&self) -> f32 {
        self.panic_radius * self.state.radius_factor()
    }

    pub fn target(&self) -> Option<TargetRef> {
        self.target
    }

    pub fn stats(&self) -> HuntStats {
        self.stats
    }

    /// Threat prey flee from, if this predator is currently frightening.
    pub fn threat(&self) -> Option<Threat> {
        (self.state.panic_strength() > 0.0).then(|| Threat {
            position: self.position,
            radius: self.effective_panic_radius(),
        })
    }

    /// Start chasing agent `index` immediately.
    ///
    /// Refused while exhausted or if the index is out of range.
    pub fn engage(&mut self, index: usize, store: &AgentStore) -> bool {
        if self.energy <= self.species.profile().exhaustion_threshold {
            return false;
        }
        match TargetRef::new(index, store) {
            Some(target) => {
                self.target = Some(target);
                self.state = PredatorState::Hunting;
                self.state_time = 0.0;
                true
            }
            None => false,
        }
    }

    /// Advance the predator by one step.
    pub fn update(&mut self, ctx: &mut PredatorContext<'_>) {
        let profile = self.species.profile();
        self.panic_radius = ctx.panic_radius;

        self.revalidate_target(ctx);
        self.state_time += ctx.dt;
        self.update_energy(ctx.dt);

        if self.energy < profile.exhaustion_threshold && self.state != PredatorState::Recovering {
            self.enter(PredatorState::Recovering, ctx);
        }

        let desired = self.think(ctx);
        let flight = physics::fly(
            Flight { position: self.position, velocity: self.velocity, heading: self.heading },
            desired,
            self.species,
            self.state,
            ctx.world,
            ctx.dt,
        );
        self.position = flight.position;
        self.velocity = flight.velocity;
        self.heading = flight.heading;

        self.broadcast_panic(ctx);
    }

    fn revalidate_target(&mut self, ctx: &mut PredatorContext<'_>) {
        let Some(target) = self.target else {
            return;
        };
        match target.resolve(ctx.store) {
            Some(index) => {
                if let Some(t) = self.target.as_mut() {
                    t.last_position = ctx.store.positions()[index];
                }
            }
            None => {
                debug!(predator = self.id, index = target.index, "target reference went stale");
                self.target = None;
                if self.state.needs_target() {
                    self.enter(self.species.search_state(), ctx);
                }
            }
        }
    }

    fn update_energy(&mut self, dt: f32) {
        let profile = self.species.profile();
        if self.state.regenerates() {
            self.energy += profile.energy_regen * dt;
        } else if self.state.drains() {
            let effort = (self.velocity.length() / profile.max_speed).min(1.0);
            self.energy -= profile.energy_drain * (0.5 + 0.5 * effort) * dt;
        }
        self.energy = self.energy.clamp(0.0, 1.0);
    }

    /// Switch state and run its entry action.
    pub fn enter(&mut self, next: PredatorState, ctx: &mut PredatorContext<'_>) {
        debug!(predator = self.id, species = ?self.species, from = ?self.state, to = ?next, "state transition");
        if self.attack_pending {
            // Left the attack without striking: exhaustion or a lost target.
            self.attack_pending = false;
            self.stats.failures += 1;
        }
        self.state = next;
        self.state_time = 0.0;

        if self.species.hunts_in_packs() && !matches!(next, PredatorState::Hunting | PredatorState::Attacking) {
            if let Some(pack) = ctx.pack.as_deref_mut() {
                pack.release_attack_slot(self.id);
            }
        }

        match next {
            PredatorState::Idle | PredatorState::Scanning | PredatorState::Recovering => {
                self.target = None;
            }
            PredatorState::Circling => {
                self.target = None;
                let side = Vec2::from_angle(self.heading).perp();
                self.orbit_center = self.position + side * self.panic_radius;
            }
            PredatorState::Attacking => {
                self.stats.attempts += 1;
                self.attack_pending = true;
                let p = self.attack_probability(ctx.store);
                self.attack_roll = ctx.rng.gen::<f32>() < p;
                debug!(predator = self.id, probability = p, hit = self.attack_roll, "attack rolled");
            }
            _ => {}
        }
    }

    fn attack_probability(&self, store: &AgentStore) -> f32 {
        let profile = self.species.profile();
        let approach = self.velocity.length() / (profile.max_speed * profile.burst_multiplier);
        match self.target.and_then(|t| t.resolve(store)) {
            Some(i) => attack_success_probability(store.energy()[i], store.panic_levels()[i], store.local_density()[i], approach),
            None => ATTACK_PROBABILITY_FLOOR,
        }
    }

    /// Target position and distance, if the target is valid.
    fn target_fix(&self, store: &AgentStore) -> Option<(usize, Vec2, f32)> {
        let index = self.target?.resolve(store)?;
        let pos = store.positions()[index];
        Some((index, pos, pos.distance(self.position)))
    }

    fn toward(&self, point: Vec2, speed: f32) -> Vec2 {
        (point - self.position).normalize_or_zero() * speed
    }

    /// Burst pursuit. Speed drops while the target is off the nose so the
    /// turn radius stays inside the remaining distance.
    fn pursue(&self, point: Vec2, top: f32) -> Vec2 {
        let dir = (point - self.position).normalize_or_zero();
        let alignment = Vec2::from_angle(self.heading).dot(dir).max(0.0);
        dir * top * (0.25 + 0.75 * alignment)
    }

    fn cruise(&self, factor: f32) -> Vec2 {
        Vec2::from_angle(self.heading) * self.species.profile().cruise_speed * factor
    }

    /// Per-state update: returns the desired velocity and applies transitions.
    fn think(&mut self, ctx: &mut PredatorContext<'_>) -> Vec2 {
        let profile = self.species.profile();
        let r = self.panic_radius;

        match self.state {
            PredatorState::Idle => {
                if self.state_time >= profile.idle_duration {
                    self.enter(self.species.search_state(), ctx);
                }
                self.cruise(1.0)
            }
            PredatorState::Scanning | PredatorState::Circling => {
                if let Some(target) = self.acquire_target(ctx) {
                    self.target = Some(target);
                    self.enter(self.species.pursuit_state(), ctx);
                    return self.toward(target.last_position, profile.cruise_speed);
                }
                if self.state_time >= profile.scan_duration {
                    self.enter(PredatorState::Idle, ctx);
                }
                if self.state == PredatorState::Circling {
                    let radial = self.position - self.orbit_center;
                    let tangent = radial.perp().normalize_or_zero();
                    let correction = -radial.normalize_or_zero() * (radial.length() - r) / r.max(1.0);
                    (tangent + correction) * profile.cruise_speed * 1.3
                } else {
                    let sweep = Vec2::from_angle(self.heading + (self.state_time * 0.7).sin() * 0.5);
                    sweep * profile.cruise_speed * 1.2
                }
            }
            PredatorState::Stalking => {
                let Some((_, pos, d)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                if d < r || self.state_time >= profile.stalk_duration {
                    self.enter(PredatorState::Hunting, ctx);
                }
                self.toward(pos, profile.cruise_speed * 1.2)
            }
            PredatorState::Hunting => {
                let Some((index, pos, d)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                if d < r * ATTACK_RANGE_FACTOR {
                    if self.holds_attack_slot(ctx) {
                        self.enter(PredatorState::Attacking, ctx);
                    } else {
                        self.enter(PredatorState::Herding, ctx);
                    }
                } else if d > r * LOSE_TARGET_FACTOR {
                    self.enter(self.species.search_state(), ctx);
                } else if self.state_time >= profile.hunt_duration {
                    self.stats.timeouts += 1;
                    self.enter(PredatorState::Recovering, ctx);
                }
                let lead = (d / profile.max_speed).min(1.0);
                let aim = pos + ctx.store.velocities()[index] * lead;
                self.toward(aim, profile.max_speed)
            }
            PredatorState::Diving => {
                let Some((_, pos, d)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                if d < r * ATTACK_RANGE_FACTOR {
                    self.enter(PredatorState::Attacking, ctx);
                } else if self.state_time >= profile.hunt_duration {
                    self.stats.timeouts += 1;
                    self.enter(PredatorState::Recovering, ctx);
                }
                self.pursue(pos, profile.max_speed * profile.burst_multiplier)
            }
            PredatorState::Attacking => {
                let Some((index, pos, d)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                if d < STRIKE_DISTANCE {
                    let hit = self.attack_roll;
                    self.resolve_attack(index, hit, ctx);
                } else if self.state_time >= profile.attack_duration {
                    self.resolve_attack(index, false, ctx);
                }
                self.pursue(pos, profile.max_speed * profile.burst_multiplier)
            }
            PredatorState::Recovering => {
                if self.state_time >= profile.recovery_duration && self.energy >= profile.recovery_threshold {
                    self.enter(PredatorState::Idle, ctx);
                }
                self.cruise(0.8)
            }
            PredatorState::Ascending => {
                let Some((_, pos, _)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                if self.state_time >= profile.branch_duration {
                    self.enter(PredatorState::Diving, ctx);
                }
                // Open up distance to gain room for the stoop, then line up.
                if self.state_time >= profile.branch_duration * 0.5 {
                    return self.toward(pos, profile.cruise_speed);
                }
                let mut away = (self.position - pos).normalize_or_zero();
                if away == Vec2::ZERO {
                    away = Vec2::from_angle(self.heading);
                }
                self.toward(pos + away * r * 1.5, profile.cruise_speed * 1.5)
            }
            PredatorState::Ambushing => {
                let Some((_, _, d)) = self.target_fix(ctx.store) else {
                    return Vec2::ZERO;
                };
                if d < r * AMBUSH_TRIGGER_FACTOR {
                    self.enter(PredatorState::Attacking, ctx);
                } else if self.state_time >= profile.branch_duration {
                    self.enter(self.species.search_state(), ctx);
                }
                Vec2::ZERO
            }
            PredatorState::Herding => {
                let Some((_, pos, _)) = self.target_fix(ctx.store) else {
                    return self.cruise(1.0);
                };
                let station = pos + Vec2::from_angle(self.herding_bearing(pos, ctx)) * r * 0.8;

                if self.state_time >= profile.branch_duration {
                    let open = ctx.pack.as_deref().map_or(true, |p| p.attack_slot_available());
                    if open && self.holds_attack_slot(ctx) {
                        self.enter(PredatorState::Hunting, ctx);
                        return self.toward(pos, profile.max_speed);
                    }
                }
                self.toward(station, profile.max_speed * 0.8)
            }
        }
    }

    /// Bearing from the target to this herder's station. Herders fan out
    /// from the side the pack approaches from, so the flock is pushed away
    /// from the pack centre.
    fn herding_bearing(&self, target: Vec2, ctx: &PredatorContext<'_>) -> f32 {
        let Some(pack) = ctx.pack.as_deref() else {
            return self.heading + std::f32::consts::PI;
        };
        let approach = pack
            .pack_center()
            .map(|c| c - target)
            .filter(|v| v.length_squared() > MIN_DISTANCE * MIN_DISTANCE)
            .unwrap_or_else(|| self.position - target);
        approach.y.atan2(approach.x) + pack.assigned_sector(self.id).unwrap_or(0.0)
    }

    /// Claim the pack's attack slot. Solo species always hold it.
    fn holds_attack_slot(&self, ctx: &mut PredatorContext<'_>) -> bool {
        if !self.species.hunts_in_packs() {
            return true;
        }
        ctx.pack.as_deref_mut().map_or(true, |pack| pack.claim_attack_slot(self.id))
    }

    fn resolve_attack(&mut self, index: usize, hit: bool, ctx: &mut PredatorContext<'_>) {
        self.attack_pending = false;
        if hit {
            self.stats.successes += 1;
            let at = ctx.store.positions()[index];
            ctx.store.raise_panic(index, 1.0);
            ctx.store.drain_energy(index, CATCH_ENERGY_LOSS);
            ctx.store.apply_panic(at, self.panic_radius * CATCH_PANIC_RADIUS_FACTOR, 1.0);
            self.energy = (self.energy + MEAL_ENERGY).min(1.0);
            debug!(predator = self.id, target = index, "attack succeeded");
        } else {
            self.stats.failures += 1;
            debug!(predator = self.id, target = index, "attack missed");
        }
        self.enter(PredatorState::Recovering, ctx);
    }

    /// Best-scoring prey within the scan radius, if any clears the threshold.
    fn acquire_target(&self, ctx: &PredatorContext<'_>) -> Option<TargetRef> {
        let profile = self.species.profile();
        let store = &*ctx.store;
        let radius = self.panic_radius * SCAN_RADIUS_FACTOR;
        if radius <= 0.0 {
            return None;
        }
        let prey_max = ctx.sim.max_speed.max(1.0);

        let mut best: Option<(usize, f32)> = None;
        ctx.grid.for_each_candidate(self.position, radius, |j| {
            if j >= store.count() {
                return;
            }
            let pos = store.positions()[j];
            let d = pos.distance(self.position);
            if d >= radius {
                return;
            }
            let vel = store.velocities()[j];
            let speed_ratio = (vel.length() / profile.max_speed).min(1.0);
            let factors = TargetFactors {
                isolation: 1.0 - store.local_density()[j],
                edge: 1.0 - (wall_distance(pos, ctx.world) / EDGE_SCORE_RANGE).clamp(0.0, 1.0),
                low_relative_velocity: 1.0 - ((vel - self.velocity).length() / (2.0 * prey_max)).min(1.0),
                panic: store.panic_levels()[j],
                intercept: (1.0 - d / radius) * (1.0 - 0.5 * speed_ratio),
                exhaustion: 1.0 - store.energy()[j],
            };
            let score = score_target(&profile.weights, &factors);
            if score >= MIN_TARGET_SCORE && best.map_or(true, |(_, s)| score > s) {
                best = Some((j, score));
            }
        });
        best.and_then(|(j, _)| TargetRef::new(j, store))
    }

    fn broadcast_panic(&self, ctx: &mut PredatorContext<'_>) {
        let strength = self.state.panic_strength();
        let radius = self.effective_panic_radius();
        if strength <= 0.0 || radius <= 0.0 {
            return;
        }
        let grid = ctx.grid;
        let store = &mut *ctx.store;
        grid.for_each_candidate(self.position, radius, |j| {
            if j >= store.count() {
                return;
            }
            let d = store.positions()[j].distance(self.position);
            if d < radius {
                store.raise_panic(j, strength * (1.0 - d / radius).max(MIN_DISTANCE));
            }
        });
    }
}
