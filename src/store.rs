//! Structure-of-arrays agent storage.
//!
//! Every per-agent attribute lives in its own contiguous array indexed by
//! agent id. The store owns all rows; agents are created in batches (the
//! whole store is rebuilt) and cleared en masse on reset. Each rebuild or
//! reset bumps [`AgentStore::generation`], and every row is stamped with a
//! serial that is never reused, so holders of raw indices can tell that the
//! row they pointed at has been replaced (see [`AgentStore::serial`]).
//!
//! Feeding and mating fields belong to external collaborators. The core only
//! clears them when an agent panics and restores energy on request.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{EnvironmentConfig, SimulationConfig};
use crate::firefly;

/// Panic level above which feeding and mating behaviour is suppressed.
pub const FEEDING_PANIC_LIMIT: f32 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Female,
    Male,
}

/// Feeding progress, owned by the food-source collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedingState {
    #[default]
    None,
    Seeking,
    Eating,
}

/// Mating progress, owned by the mating collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatingState {
    #[default]
    None,
    Seeking,
    Courting,
}

/// Initial values for one agent in a batch spawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentSeed {
    pub position: Vec2,
    pub velocity: Vec2,
    pub panic: f32,
    pub energy: f32,
    pub gender: Gender,
    pub glow_phase: f32,
    pub natural_frequency: f32,
}

impl Default for AgentSeed {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            panic: 0.0,
            energy: 1.0,
            gender: Gender::Female,
            glow_phase: 0.0,
            natural_frequency: 1.0,
        }
    }
}

impl AgentSeed {
    /// Random agent somewhere inside `[min, max]`.
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        min: Vec2,
        max: Vec2,
        sim: &SimulationConfig,
        env: &EnvironmentConfig,
    ) -> Self {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let speed = sim.max_speed * rng.gen_range(0.3..0.7);
        let variation = env.firefly.frequency_variation.abs();
        let jitter = if variation > 0.0 { rng.gen_range(-variation..variation) } else { 0.0 };
        Self {
            position: Vec2::new(rng.gen_range(min.x..=max.x), rng.gen_range(min.y..=max.y)),
            velocity: Vec2::from_angle(angle) * speed,
            panic: 0.0,
            energy: 1.0,
            gender: if rng.gen_bool(0.5) { Gender::Female } else { Gender::Male },
            glow_phase: rng.gen_range(0.0..1.0),
            natural_frequency: 1.0 + jitter,
        }
    }
}

/// Fixed-capacity SoA container for all agents.
#[derive(Clone, Debug)]
pub struct AgentStore {
    capacity: usize,
    generation: u64,
    next_serial: u64,
    serials: Vec<u64>,
    pub(crate) positions: Vec<Vec2>,
    pub(crate) velocities: Vec<Vec2>,
    pub(crate) headings: Vec<f32>,
    pub(crate) panic: Vec<f32>,
    pub(crate) density: Vec<f32>,
    pub(crate) energy: Vec<f32>,
    pub(crate) gender: Vec<Gender>,
    pub(crate) feeding_state: Vec<FeedingState>,
    pub(crate) target_food: Vec<Option<u32>>,
    pub(crate) feeding_timer: Vec<f32>,
    pub(crate) mating_state: Vec<MatingState>,
    pub(crate) mate_target: Vec<Option<u32>>,
    pub(crate) mating_timer: Vec<f32>,
    pub(crate) glow_phase: Vec<f32>,
    pub(crate) natural_frequency: Vec<f32>,
    pub(crate) glow_intensity: Vec<f32>,
}

impl AgentStore {
    /// Empty store able to hold `capacity` agents.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            generation: 0,
            next_serial: 0,
            serials: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            headings: Vec::with_capacity(capacity),
            panic: Vec::with_capacity(capacity),
            density: Vec::with_capacity(capacity),
            energy: Vec::with_capacity(capacity),
            gender: Vec::with_capacity(capacity),
            feeding_state: Vec::with_capacity(capacity),
            target_food: Vec::with_capacity(capacity),
            feeding_timer: Vec::with_capacity(capacity),
            mating_state: Vec::with_capacity(capacity),
            mate_target: Vec::with_capacity(capacity),
            mating_timer: Vec::with_capacity(capacity),
            glow_phase: Vec::with_capacity(capacity),
            natural_frequency: Vec::with_capacity(capacity),
            glow_intensity: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Incremented every time rows are replaced wholesale.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Serial stamped on row `i` when it was pushed. Serials are never
    /// reused, so a row replaced after a shrink and regrow gets a new one.
    #[inline]
    pub fn serial(&self, i: usize) -> Option<u64> {
        self.serials.get(i).copied()
    }

    /// Remove every agent.
    pub fn clear(&mut self) {
        self.truncate(0);
        self.generation += 1;
    }

    /// Drop agents with index `>= count`. Surviving rows keep their indices.
    pub fn truncate(&mut self, count: usize) {
        self.serials.truncate(count);
        self.positions.truncate(count);
        self.velocities.truncate(count);
        self.headings.truncate(count);
        self.panic.truncate(count);
        self.density.truncate(count);
        self.energy.truncate(count);
        self.gender.truncate(count);
        self.feeding_state.truncate(count);
        self.target_food.truncate(count);
        self.feeding_timer.truncate(count);
        self.mating_state.truncate(count);
        self.mate_target.truncate(count);
        self.mating_timer.truncate(count);
        self.glow_phase.truncate(count);
        self.natural_frequency.truncate(count);
        self.glow_intensity.truncate(count);
    }

    /// Replace the whole population. Seeds beyond capacity are dropped.
    ///
    /// Returns the number of agents now stored.
    pub fn rebuild_from<I>(&mut self, seeds: I, env: &EnvironmentConfig) -> usize
    where
        I: IntoIterator<Item = AgentSeed>,
    {
        self.truncate(0);
        self.generation += 1;
        self.extend(seeds, env)
    }

    /// Append a batch of agents after the existing ones, up to capacity.
    pub fn extend<I>(&mut self, seeds: I, env: &EnvironmentConfig) -> usize
    where
        I: IntoIterator<Item = AgentSeed>,
    {
        let room = self.capacity - self.count();
        for seed in seeds.into_iter().take(room) {
            self.push(seed, env);
        }
        self.count()
    }

    fn push(&mut self, seed: AgentSeed, env: &EnvironmentConfig) {
        let phase = seed.glow_phase.rem_euclid(1.0);
        let phase = if phase < 1.0 { phase } else { 0.0 };
        let rate = env.firefly.base_frequency * seed.natural_frequency;

        self.serials.push(self.next_serial);
        self.next_serial += 1;
        self.positions.push(seed.position);
        self.velocities.push(seed.velocity);
        self.headings.push(if seed.velocity.length() > 0.1 { seed.velocity.y.atan2(seed.velocity.x) } else { 0.0 });
        self.panic.push(seed.panic.clamp(0.0, 1.0));
        self.density.push(0.0);
        self.energy.push(seed.energy.clamp(0.0, 1.0));
        self.gender.push(seed.gender);
        self.feeding_state.push(FeedingState::None);
        self.target_food.push(None);
        self.feeding_timer.push(0.0);
        self.mating_state.push(MatingState::None);
        self.mate_target.push(None);
        self.mating_timer.push(0.0);
        self.glow_phase.push(phase);
        self.natural_frequency.push(seed.natural_frequency);
        self.glow_intensity.push(firefly::glow_intensity(phase, rate, env.firefly.flash_duration));
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    /// Cached heading in radians.
    pub fn headings(&self) -> &[f32] {
        &self.headings
    }

    pub fn panic_levels(&self) -> &[f32] {
        &self.panic
    }

    /// Neighbour count normalised to [0, 1].
    pub fn local_density(&self) -> &[f32] {
        &self.density
    }

    pub fn energy(&self) -> &[f32] {
        &self.energy
    }

    pub fn genders(&self) -> &[Gender] {
        &self.gender
    }

    pub fn glow_phase(&self) -> &[f32] {
        &self.glow_phase
    }

    pub fn natural_frequency(&self) -> &[f32] {
        &self.natural_frequency
    }

    pub fn glow_intensity(&self) -> &[f32] {
        &self.glow_intensity
    }

    pub fn feeding_state(&self) -> &[FeedingState] {
        &self.feeding_state
    }

    pub fn target_food(&self) -> &[Option<u32>] {
        &self.target_food
    }

    pub fn feeding_timer(&self) -> &[f32] {
        &self.feeding_timer
    }

    pub fn mating_state(&self) -> &[MatingState] {
        &self.mating_state
    }

    pub fn mate_target(&self) -> &[Option<u32>] {
        &self.mate_target
    }

    pub fn mating_timer(&self) -> &[f32] {
        &self.mating_timer
    }

    /// Record feeding progress for agent `i`. Ignored while the agent panics.
    pub fn set_feeding(&mut self, i: usize, state: FeedingState, target: Option<u32>, timer: f32) {
        if i < self.count() && self.panic[i] <= FEEDING_PANIC_LIMIT {
            self.feeding_state[i] = state;
            self.target_food[i] = target;
            self.feeding_timer[i] = timer.max(0.0);
        }
    }

    /// Record mating progress for agent `i`. Ignored while the agent panics.
    pub fn set_mating(&mut self, i: usize, state: MatingState, target: Option<u32>, timer: f32) {
        if i < self.count() && self.panic[i] <= FEEDING_PANIC_LIMIT {
            self.mating_state[i] = state;
            self.mate_target[i] = target;
            self.mating_timer[i] = timer.max(0.0);
        }
    }

    /// Add energy to agent `i`, saturating at 1.
    pub fn restore_energy(&mut self, i: usize, amount: f32) {
        if let Some(e) = self.energy.get_mut(i) {
            *e = (*e + amount.max(0.0)).min(1.0);
        }
    }

    /// Remove energy from agent `i`, saturating at 0.
    pub fn drain_energy(&mut self, i: usize, amount: f32) {
        if let Some(e) = self.energy.get_mut(i) {
            *e = (*e - amount.max(0.0)).max(0.0);
        }
    }

    /// Raise panic for agent `i` to at least `level`.
    pub fn raise_panic(&mut self, i: usize, level: f32) {
        if i >= self.count() {
            return;
        }
        let level = level.clamp(0.0, 1.0);
        if level > self.panic[i] {
            self.panic[i] = level;
        }
        self.suppress_if_panicked(i);
    }

    /// Raise panic around `center` with linear falloff to zero at `radius`.
    ///
    /// Returns how many agents were affected.
    pub fn apply_panic(&mut self, center: Vec2, radius: f32, strength: f32) -> usize {
        if radius <= 0.0 || strength <= 0.0 {
            return 0;
        }
        let r_sq = radius * radius;
        let mut affected = 0;
        for i in 0..self.count() {
            let d_sq = self.positions[i].distance_squared(center);
            if d_sq < r_sq {
                let falloff = 1.0 - d_sq.sqrt() / radius;
                self.raise_panic(i, strength * falloff);
                affected += 1;
            }
        }
        affected
    }

    /// Clear feeding and mating state for a panicking agent.
    pub(crate) fn suppress_if_panicked(&mut self, i: usize) {
        if self.panic[i] > FEEDING_PANIC_LIMIT {
            self.feeding_state[i] = FeedingState::None;
            self.target_food[i] = None;
            self.feeding_timer[i] = 0.0;
            self.mating_state[i] = MatingState::None;
            self.mate_target[i] = None;
            self.mating_timer[i] = 0.0;
        }
    }

    /// Pull every agent inside `[min, max]`.
    pub(crate) fn clamp_positions(&mut self, min: Vec2, max: Vec2) {
        for p in &mut self.positions {
            *p = p.clamp(min, max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn seed_at(x: f32, y: f32) -> AgentSeed {
        AgentSeed { position: Vec2::new(x, y), ..Default::default() }
    }

    #[test]
    fn test_rebuild_truncates_to_capacity() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(3);
        let n = store.rebuild_from((0..10).map(|i| seed_at(i as f32, 0.0)), &env);
        assert_eq!(n, 3);
        assert_eq!(store.count(), 3);
        assert_eq!(store.positions()[2], Vec2::new(2.0, 0.0));
    }

    #[test]
    fn test_generation_bumps_on_rebuild_and_clear() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(4);
        let g0 = store.generation();
        store.rebuild_from([seed_at(1.0, 1.0)], &env);
        assert_eq!(store.generation(), g0 + 1);
        store.clear();
        assert_eq!(store.generation(), g0 + 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_extend_keeps_existing_rows() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(4);
        store.rebuild_from([seed_at(1.0, 1.0)], &env);
        let g = store.generation();
        store.extend([seed_at(2.0, 2.0), seed_at(3.0, 3.0)], &env);
        assert_eq!(store.count(), 3);
        assert_eq!(store.positions()[0], Vec2::new(1.0, 1.0));
        assert_eq!(store.generation(), g);
    }

    #[test]
    fn test_serials_are_not_reused_after_shrink() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(8);
        store.rebuild_from((0..6).map(|i| seed_at(i as f32, 0.0)), &env);
        let kept = store.serial(1);
        let dropped = store.serial(5);
        store.truncate(3);
        assert_eq!(store.serial(5), None);
        store.extend((0..4).map(|i| seed_at(i as f32, 9.0)), &env);
        assert_eq!(store.count(), 7);
        assert_eq!(store.serial(1), kept);
        assert_ne!(store.serial(5), dropped);
    }

    #[test]
    fn test_seed_values_are_clamped() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(1);
        store.rebuild_from(
            [AgentSeed { panic: 4.0, energy: -1.0, glow_phase: 1.25, ..Default::default() }],
            &env,
        );
        assert_eq!(store.panic_levels()[0], 1.0);
        assert_eq!(store.energy()[0], 0.0);
        assert!((store.glow_phase()[0] - 0.25).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&store.glow_intensity()[0]));
    }

    #[test]
    fn test_apply_panic_falloff_and_suppression() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(3);
        store.rebuild_from([seed_at(0.0, 0.0), seed_at(50.0, 0.0), seed_at(500.0, 0.0)], &env);
        store.set_feeding(0, FeedingState::Eating, Some(7), 2.0);
        store.set_feeding(1, FeedingState::Seeking, Some(3), 1.0);

        let affected = store.apply_panic(Vec2::ZERO, 100.0, 1.0);
        assert_eq!(affected, 2);
        assert_eq!(store.panic_levels()[0], 1.0);
        assert!((store.panic_levels()[1] - 0.5).abs() < 1e-6);
        assert_eq!(store.panic_levels()[2], 0.0);

        assert_eq!(store.feeding_state()[0], FeedingState::None);
        assert_eq!(store.target_food()[0], None);
        assert_eq!(store.feeding_state()[1], FeedingState::None);
    }

    #[test]
    fn test_panic_never_lowers_existing_level() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(1);
        store.rebuild_from([AgentSeed { panic: 0.9, ..Default::default() }], &env);
        store.raise_panic(0, 0.2);
        assert_eq!(store.panic_levels()[0], 0.9);
    }

    #[test]
    fn test_feeding_refused_while_panicking() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(1);
        store.rebuild_from([AgentSeed { panic: 0.8, ..Default::default() }], &env);
        store.set_feeding(0, FeedingState::Seeking, Some(1), 1.0);
        assert_eq!(store.feeding_state()[0], FeedingState::None);
    }

    #[test]
    fn test_restore_energy_saturates() {
        let env = EnvironmentConfig::default();
        let mut store = AgentStore::with_capacity(1);
        store.rebuild_from([AgentSeed { energy: 0.5, ..Default::default() }], &env);
        store.restore_energy(0, 0.3);
        assert!((store.energy()[0] - 0.8).abs() < 1e-6);
        store.restore_energy(0, 5.0);
        assert_eq!(store.energy()[0], 1.0);
        store.restore_energy(9, 1.0);
    }

    #[test]
    fn test_random_seed_inside_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let sim = SimulationConfig::default();
        let env = EnvironmentConfig::default();
        for _ in 0..200 {
            let s = AgentSeed::random(&mut rng, Vec2::splat(10.0), Vec2::new(90.0, 40.0), &sim, &env);
            assert!(s.position.x >= 10.0 && s.position.x <= 90.0);
            assert!(s.position.y >= 10.0 && s.position.y <= 40.0);
            assert!(s.velocity.length() <= sim.max_speed);
            assert!((0.0..1.0).contains(&s.glow_phase));
        }
    }
}
