//! # murmur - starling murmuration engine
//!
//! A 2D flocking simulation with firefly-style flash synchronisation and
//! raptor predators.
//!
//! murmur owns the flock state and advances it in fixed 1/60 s steps. You
//! hand it the configuration every frame and read the agent arrays back for
//! rendering or statistics.
//!
//! ## Quick Start
//!
//! ```ignore
//! use murmur::prelude::*;
//!
//! let sim = SimulationConfig::default();
//! let env = EnvironmentConfig::default();
//!
//! let mut flock = Simulator::new(5_000, 1280.0, 720.0, sim.perception_radius)?
//!     .with_execution_mode(ExecutionMode::Parallel);
//! flock.spawn(2_000, &sim, &env, 42);
//! flock.spawn_predator(Species::Falcon, Vec2::new(100.0, 100.0));
//!
//! loop {
//!     flock.update(frame_dt, &sim, &env);
//!     draw(flock.agents().positions(), flock.agents().glow_intensity());
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Agents
//!
//! [`AgentStore`] keeps one contiguous array per attribute (position,
//! velocity, heading, panic, density, energy, glow phase, ...). Agents are
//! spawned in batches and cleared together; there is no per-agent delete.
//!
//! ### Forces
//!
//! Every agent sums alignment, cohesion, separation, boundary avoidance,
//! wall damping and jitter, wind, wander, flight from predators and any
//! user attractors. See [`forces`].
//!
//! ### Execution modes
//!
//! The per-agent step is a pure function of a snapshot, so it can run as a
//! plain loop, a rayon map, or a WGSL compute kernel:
//!
//! ```ignore
//! flock.set_execution_mode(ExecutionMode::Sequential);
//! flock.set_execution_mode(ExecutionMode::Parallel);
//! if flock.enable_gpu().is_err() {
//!     // stays on the CPU
//! }
//! ```
//!
//! All three produce the same result within floating-point tolerance.
//!
//! ### Flash synchronisation
//!
//! Each agent is a pulse-coupled oscillator. Flashing neighbours nudge an
//! agent's phase forward, so a flock with [`FireflyConfig::coupling_strength`]
//! above zero drifts into synchrony. See [`firefly`].
//!
//! ### Predators
//!
//! [`Predator`]s run a per-species state machine, panic nearby prey and
//! attempt catches. Pack hunters coordinate through a [`PackCoordinator`].

pub mod attractors;
pub mod config;
pub mod error;
pub mod firefly;
pub mod forces;
pub mod gpu;
pub mod noise;
pub mod predator;
pub mod simulation;
pub mod spatial;
pub mod step;
pub mod store;
pub mod time;

pub use attractors::Attractor;
pub use config::{CouplingMode, EnvironmentConfig, FireflyConfig, PredatorConfig, SimulationConfig, WindConfig};
pub use error::{ConfigError, GpuError};
pub use glam::Vec2;
pub use gpu::FlockKernel;
pub use predator::{HuntStats, PackCoordinator, PackRoster, Predator, PredatorState, Species};
pub use simulation::{ExecutionMode, FlockStats, Simulator};
pub use spatial::SpatialGrid;
pub use step::FIXED_DT;
pub use store::{AgentSeed, AgentStore, FeedingState, Gender, MatingState};
pub use time::FixedTimestep;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::attractors::Attractor;
    pub use crate::config::{CouplingMode, EnvironmentConfig, FireflyConfig, PredatorConfig, SimulationConfig, WindConfig};
    pub use crate::error::{ConfigError, GpuError};
    pub use crate::predator::{PackCoordinator, PackRoster, Predator, PredatorState, Species};
    pub use crate::simulation::{ExecutionMode, FlockStats, Simulator};
    pub use crate::store::{AgentSeed, AgentStore, FeedingState, Gender, MatingState};
    pub use crate::Vec2;
}
