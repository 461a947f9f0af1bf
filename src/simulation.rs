//! The simulator: owns the flock and drives fixed-timestep ticks.
//!
//! One [`Simulator::step`] runs, in order:
//!
//! 1. rebuild the spatial grid from the current positions,
//! 2. compute every agent's motion update from that snapshot
//!    (sequentially, with rayon, or on the GPU),
//! 3. compute every agent's oscillator update from the same snapshot,
//! 4. write all updates back into the store,
//! 5. age attractors and run the predators against the new state.
//!
//! Steps 2 and 3 never write to the store, so every execution mode yields
//! the same result up to floating-point rounding.

use glam::Vec2;
use rand::{rngs::SmallRng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attractors::{self, Attractor};
use crate::config::{EnvironmentConfig, PredatorConfig, SimulationConfig};
use crate::error::{ConfigError, GpuError};
use crate::firefly::{self, OscillatorContext, OscillatorUpdate};
use crate::forces::Threat;
use crate::gpu::FlockKernel;
use crate::predator::{HuntStats, PackCoordinator, Predator, PredatorContext, Species};
use crate::spatial::SpatialGrid;
use crate::step::{AgentUpdate, StepContext, EDGE_PADDING};
use crate::store::{AgentSeed, AgentStore};
use crate::time::FixedTimestep;

/// Where the per-agent compute phase runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Single-threaded loop over agents.
    #[default]
    Sequential,
    /// Rayon map over agents.
    Parallel,
    /// WGSL compute kernel. Requires [`Simulator::enable_gpu`].
    Gpu,
}

/// Aggregate numbers for statistics collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlockStats {
    pub agents: usize,
    pub mean_speed: f32,
    pub mean_panic: f32,
    pub mean_energy: f32,
    pub flashing_fraction: f32,
    /// Kuramoto order parameter of the glow phases, 1.0 = in sync.
    pub phase_coherence: f32,
    pub hunts: HuntStats,
}

fn validate_world(width: f32, height: f32) -> Result<Vec2, ConfigError> {
    if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
        Ok(Vec2::new(width, height))
    } else {
        Err(ConfigError::InvalidWorldSize { width, height })
    }
}

fn mean(values: impl ExactSizeIterator<Item = f32>) -> f32 {
    let n = values.len();
    if n == 0 {
        0.0
    } else {
        values.sum::<f32>() / n as f32
    }
}

/// A flock, its predators and externally driven forces.
pub struct Simulator {
    store: AgentStore,
    grid: SpatialGrid,
    world: Vec2,
    predators: Vec<Predator>,
    pack: Option<Box<dyn PackCoordinator>>,
    attractors: Vec<Attractor>,
    clock: FixedTimestep,
    tick: u64,
    mode: ExecutionMode,
    gpu: Option<FlockKernel>,
    rng: SmallRng,
    next_predator_id: u32,
}

impl Simulator {
    /// Empty simulator for up to `capacity` agents in a `width` x `height` world.
    ///
    /// `cell_size` should match the flock's perception radius.
    pub fn new(capacity: usize, width: f32, height: f32, cell_size: f32) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let world = validate_world(width, height)?;
        let grid = SpatialGrid::new(cell_size, width, height)?;
        Ok(Self {
            store: AgentStore::with_capacity(capacity),
            grid,
            world,
            predators: Vec::new(),
            pack: None,
            attractors: Vec::new(),
            clock: FixedTimestep::default(),
            tick: 0,
            mode: ExecutionMode::Sequential,
            gpu: None,
            rng: SmallRng::seed_from_u64(0),
            next_predator_id: 0,
        })
    }

    /// Select a CPU execution mode. `Gpu` is ignored here; use [`Simulator::enable_gpu`].
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.set_execution_mode(mode);
        self
    }

    pub fn with_timestep(mut self, clock: FixedTimestep) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pack_coordinator(mut self, pack: Box<dyn PackCoordinator>) -> Self {
        self.pack = Some(pack);
        self
    }

    /// Replace the population with `count` random agents, truncated to capacity.
    ///
    /// Spawning is deterministic for a given `seed`. Returns the new count.
    pub fn spawn(&mut self, count: usize, sim: &SimulationConfig, env: &EnvironmentConfig, seed: u64) -> usize {
        self.rng = SmallRng::seed_from_u64(seed);
        let (min, max) = self.spawn_bounds();
        let rng = &mut self.rng;
        let seeds: Vec<AgentSeed> = (0..count.min(self.store.capacity()))
            .map(|_| AgentSeed::random(&mut *rng, min, max, sim, env))
            .collect();
        let spawned = self.store.rebuild_from(seeds, env);
        if spawned < count {
            warn!(requested = count, capacity = self.store.capacity(), "spawn truncated to capacity");
        }
        self.grid.rebuild(self.store.positions());
        info!(agents = spawned, seed, "flock spawned");
        spawned
    }

    /// Replace the population with explicit seeds, truncated to capacity.
    pub fn spawn_seeds<I>(&mut self, seeds: I, env: &EnvironmentConfig) -> usize
    where
        I: IntoIterator<Item = AgentSeed>,
    {
        let spawned = self.store.rebuild_from(seeds, env);
        self.grid.rebuild(self.store.positions());
        info!(agents = spawned, "flock spawned from seeds");
        spawned
    }

    /// Grow or shrink the flock. New agents are placed at random.
    pub fn set_bird_count(&mut self, count: usize, sim: &SimulationConfig, env: &EnvironmentConfig) -> usize {
        let current = self.store.count();
        if count <= current {
            self.store.truncate(count);
        } else {
            let (min, max) = self.spawn_bounds();
            let rng = &mut self.rng;
            let room = self.store.capacity() - current;
            let seeds: Vec<AgentSeed> = (0..(count - current).min(room))
                .map(|_| AgentSeed::random(&mut *rng, min, max, sim, env))
                .collect();
            self.store.extend(seeds, env);
        }
        self.grid.rebuild(self.store.positions());
        debug!(from = current, to = self.store.count(), "bird count changed");
        self.store.count()
    }

    /// Set the grid cell size used for neighbour queries. [`Simulator::step`]
    /// resets it to the perception radius of the config it is given.
    pub fn set_perception_radius(&mut self, radius: f32) -> Result<(), ConfigError> {
        self.grid.set_cell_size(radius)?;
        self.grid.rebuild(self.store.positions());
        Ok(())
    }

    /// Change the world size and pull every agent back inside it.
    pub fn resize_world(&mut self, width: f32, height: f32) -> Result<(), ConfigError> {
        self.world = validate_world(width, height)?;
        self.grid.resize(width, height);
        let lo = Vec2::splat(EDGE_PADDING);
        self.store.clamp_positions(lo, (self.world - lo).max(lo));
        self.grid.rebuild(self.store.positions());
        info!(width, height, "world resized");
        Ok(())
    }

    /// Remove every agent, predator and attractor and rewind time.
    pub fn reset(&mut self) {
        self.store.clear();
        self.predators.clear();
        self.attractors.clear();
        self.clock.reset();
        self.tick = 0;
        self.next_predator_id = 0;
        if let Some(pack) = self.pack.as_deref_mut() {
            pack.refresh(&[]);
        }
        self.grid.rebuild(self.store.positions());
        info!("simulation reset");
    }

    /// Returns false if the mode could not be selected.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) -> bool {
        if mode == ExecutionMode::Gpu && self.gpu.is_none() {
            warn!("GPU mode requested without an initialised kernel, staying on {:?}", self.mode);
            return false;
        }
        if mode != self.mode {
            info!(from = ?self.mode, to = ?mode, "execution mode changed");
        }
        self.mode = mode;
        true
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Acquire a GPU and switch to [`ExecutionMode::Gpu`].
    ///
    /// On error the simulator is unchanged and stays on its CPU path.
    pub fn enable_gpu(&mut self) -> Result<(), GpuError> {
        match FlockKernel::new(self.store.capacity()) {
            Ok(kernel) => {
                info!(adapter = kernel.adapter_name(), "GPU execution enabled");
                self.gpu = Some(kernel);
                self.mode = ExecutionMode::Gpu;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "GPU unavailable");
                Err(e)
            }
        }
    }

    /// Advance by `real_dt` seconds of wall time. Returns the steps run.
    pub fn update(&mut self, real_dt: f32, sim: &SimulationConfig, env: &EnvironmentConfig) -> u32 {
        let steps = self.clock.advance(real_dt);
        for _ in 0..steps {
            self.step(sim, env);
        }
        steps
    }

    /// Run exactly one fixed step.
    pub fn step(&mut self, sim: &SimulationConfig, env: &EnvironmentConfig) {
        let sim = sim.sanitized();
        let env = &env.sanitized();
        let dt = self.clock.step();
        let time = self.tick as f32 * dt;

        if self.grid.cell_size() != sim.perception_radius {
            match self.grid.set_cell_size(sim.perception_radius) {
                Ok(()) => debug!(cell_size = sim.perception_radius, "grid cell size follows perception radius"),
                Err(e) => warn!(error = %e, "perception radius rejected as cell size"),
            }
        }
        self.grid.rebuild(self.store.positions());

        let threats: Vec<Threat> = if env.predator.enabled {
            self.predators.iter().filter_map(Predator::threat).collect()
        } else {
            Vec::new()
        };

        let (motion, glow) = {
            let store = &self.store;
            let ctx = StepContext {
                positions: store.positions(),
                velocities: store.velocities(),
                headings: store.headings(),
                panic: store.panic_levels(),
                energy: store.energy(),
                grid: &self.grid,
                sim: &sim,
                env,
                world: self.world,
                threats: &threats,
                attractors: &self.attractors,
                dt,
                tick: self.tick as u32,
                time,
            };
            let n = ctx.count();

            let motion: Vec<AgentUpdate> = match self.mode {
                ExecutionMode::Sequential => (0..n).map(|i| ctx.step(i)).collect(),
                ExecutionMode::Parallel => (0..n).into_par_iter().map(|i| ctx.step(i)).collect(),
                ExecutionMode::Gpu => {
                    let result = match self.gpu.as_mut() {
                        Some(kernel) => kernel.compute(&ctx),
                        None => Err(GpuError::NoAdapter),
                    };
                    match result {
                        Ok(updates) if updates.len() == n => updates,
                        Ok(updates) => {
                            warn!(expected = n, got = updates.len(), "GPU returned a short batch, falling back to CPU");
                            self.gpu = None;
                            self.mode = ExecutionMode::Parallel;
                            (0..n).into_par_iter().map(|i| ctx.step(i)).collect()
                        }
                        Err(e) => {
                            warn!(error = %e, "GPU step failed, falling back to CPU");
                            self.gpu = None;
                            self.mode = ExecutionMode::Parallel;
                            (0..n).into_par_iter().map(|i| ctx.step(i)).collect()
                        }
                    }
                }
            };

            let osc = OscillatorContext {
                positions: store.positions(),
                phases: store.glow_phase(),
                intensities: store.glow_intensity(),
                natural_frequency: store.natural_frequency(),
                grid: &self.grid,
                config: &env.firefly,
                dt,
                flashing_fraction: firefly::flashing_fraction(store.glow_intensity()),
            };
            let glow: Vec<OscillatorUpdate> = match self.mode {
                ExecutionMode::Sequential => (0..n).map(|i| osc.step(i)).collect(),
                _ => (0..n).into_par_iter().map(|i| osc.step(i)).collect(),
            };

            (motion, glow)
        };

        self.write_back(motion, glow);
        attractors::age(&mut self.attractors, dt);

        if env.predator.enabled && !self.predators.is_empty() {
            self.run_predators(&sim, &env.predator, dt);
        }

        self.tick += 1;
    }

    fn write_back(&mut self, motion: Vec<AgentUpdate>, glow: Vec<OscillatorUpdate>) {
        let store = &mut self.store;
        for (i, u) in motion.into_iter().enumerate() {
            store.positions[i] = u.position;
            store.velocities[i] = u.velocity;
            store.headings[i] = u.heading;
            store.panic[i] = u.panic;
            store.energy[i] = u.energy;
            store.density[i] = u.density;
        }
        for (i, g) in glow.into_iter().enumerate() {
            store.glow_phase[i] = g.phase;
            store.glow_intensity[i] = g.intensity;
        }
    }

    fn run_predators(&mut self, sim: &SimulationConfig, config: &PredatorConfig, dt: f32) {
        self.grid.rebuild(self.store.positions());

        if let Some(pack) = self.pack.as_deref_mut() {
            let members: Vec<(u32, Vec2)> = self
                .predators
                .iter()
                .filter(|p| p.species().hunts_in_packs())
                .map(|p| (p.id(), p.position()))
                .collect();
            pack.refresh(&members);
        }

        let mut ctx = PredatorContext {
            store: &mut self.store,
            grid: &self.grid,
            sim,
            world: self.world,
            panic_radius: config.panic_radius,
            dt,
            rng: &mut self.rng,
            pack: self.pack.as_deref_mut(),
        };
        for predator in &mut self.predators {
            predator.update(&mut ctx);
        }
    }

    /// Raise panic around a point, e.g. from a click. Returns agents affected.
    pub fn apply_panic_at_position(&mut self, x: f32, y: f32, radius: f32, strength: f32) -> usize {
        self.store.apply_panic(Vec2::new(x, y), radius, strength)
    }

    pub fn add_attractor(&mut self, attractor: Attractor) {
        self.attractors.push(attractor);
    }

    pub fn attractors(&self) -> &[Attractor] {
        &self.attractors
    }

    /// Add a predator and return its id.
    pub fn spawn_predator(&mut self, species: Species, position: Vec2) -> u32 {
        let id = self.next_predator_id;
        self.next_predator_id += 1;
        let lo = Vec2::splat(EDGE_PADDING);
        let position = position.clamp(lo, (self.world - lo).max(lo));
        self.predators
            .push(Predator::new(id, species, position, PredatorConfig::default().panic_radius));
        debug!(id, ?species, "predator spawned");
        id
    }

    pub fn remove_predator(&mut self, id: u32) -> Option<Predator> {
        let index = self.predators.iter().position(|p| p.id() == id)?;
        Some(self.predators.remove(index))
    }

    /// Point predator `id` at agent `agent` and start the chase.
    ///
    /// Returns false for unknown ids, out-of-range agents or an exhausted predator.
    pub fn engage(&mut self, id: u32, agent: usize) -> bool {
        let store = &self.store;
        match self.predators.iter_mut().find(|p| p.id() == id) {
            Some(predator) => predator.engage(agent, store),
            None => false,
        }
    }

    pub fn set_pack_coordinator(&mut self, pack: Box<dyn PackCoordinator>) {
        self.pack = Some(pack);
    }

    pub fn pack_coordinator(&self) -> Option<&dyn PackCoordinator> {
        self.pack.as_deref()
    }

    pub fn agents(&self) -> &AgentStore {
        &self.store
    }

    /// Mutable store access for feeding and mating collaborators.
    pub fn agents_mut(&mut self) -> &mut AgentStore {
        &mut self.store
    }

    pub fn predators(&self) -> &[Predator] {
        &self.predators
    }

    pub fn predator_mut(&mut self, id: u32) -> Option<&mut Predator> {
        self.predators.iter_mut().find(|p| p.id() == id)
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn world(&self) -> Vec2 {
        self.world
    }

    pub fn clock(&self) -> &FixedTimestep {
        &self.clock
    }

    /// Fixed steps run since the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> FlockStats {
        let store = &self.store;
        FlockStats {
            agents: store.count(),
            mean_speed: mean(store.velocities().iter().map(|v| v.length())),
            mean_panic: mean(store.panic_levels().iter().copied()),
            mean_energy: mean(store.energy().iter().copied()),
            flashing_fraction: firefly::flashing_fraction(store.glow_intensity()),
            phase_coherence: firefly::phase_coherence(store.glow_phase()),
            hunts: self.predators.iter().fold(HuntStats::default(), |acc, p| acc + p.stats()),
        }
    }

    fn spawn_bounds(&self) -> (Vec2, Vec2) {
        let lo = Vec2::splat(EDGE_PADDING);
        (lo, (self.world - lo).max(lo))
    }
}
