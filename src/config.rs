//! Simulation and environment configuration.
//!
//! Both config values are passed explicitly into every
//! [`Simulator::update`](crate::Simulator::update) call; nothing is read from
//! global state. Every struct uses `#[serde(default)]` so a partial JSON file
//! only needs to name the fields it changes.
//!
//! ```ignore
//! let sim = SimulationConfig { max_speed: 200.0, ..Default::default() };
//! let env = EnvironmentConfig::default();
//! simulator.update(frame_dt, &sim, &env);
//! ```

use serde::{Deserialize, Serialize};

/// Extra max-speed fraction granted at full panic.
pub const PANIC_SPEED_BOOST: f32 = 0.5;
/// Panic values below this snap to zero.
pub const PANIC_FLOOR: f32 = 0.01;
/// Scales wind speed (world units/s) into a per-frame force.
pub const WIND_FORCE_SCALE: f32 = 0.01;

/// Flocking, boundary and physics parameters for the prey population.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Base maximum speed in world units per second.
    pub max_speed: f32,
    /// Maximum steering force per frame for any single term.
    pub max_force: f32,
    /// Neighbour radius for alignment and cohesion. Also the grid cell size.
    pub perception_radius: f32,
    /// Radius inside which neighbours push each other apart.
    pub separation_radius: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub separation_weight: f32,
    /// Full field-of-view angle in degrees.
    pub field_of_view: f32,
    /// Distance from each edge where boundary steering begins.
    pub boundary_margin: f32,
    /// Weight of the boundary steering term.
    pub boundary_force: f32,
    /// Exponent applied to the smoothstep edge profile.
    pub boundary_curve: f32,
    /// Seconds of current velocity used to predict the look-ahead position.
    pub boundary_lookahead: f32,
    /// Flocking force multiplier right at the wall (1.0 at the margin edge).
    pub wall_damping_factor: f32,
    /// Magnitude of the random wall jitter, as a fraction of `max_force`.
    pub noise_strength: f32,
    pub wander_strength: f32,
    /// Spatial frequency of the wander noise field.
    pub wander_scale: f32,
    /// Temporal drift rate of the wander noise field.
    pub wander_rate: f32,
    /// Weight of the flee term away from predators.
    pub flee_weight: f32,
    /// Multiplier on positional integration.
    pub sim_speed: f32,
    pub energy_enabled: bool,
    /// Speed fraction retained at zero energy.
    pub min_energy_speed: f32,
    /// Energy lost per second at full speed.
    pub energy_decay_rate: f32,
    /// Speed enforced after a wall collision so agents cannot stall.
    pub min_escape_speed: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_speed: 150.0,
            max_force: 6.0,
            perception_radius: 50.0,
            separation_radius: 22.0,
            alignment_weight: 1.0,
            cohesion_weight: 0.8,
            separation_weight: 1.5,
            field_of_view: 270.0,
            boundary_margin: 80.0,
            boundary_force: 1.5,
            boundary_curve: 2.0,
            boundary_lookahead: 0.5,
            wall_damping_factor: 0.3,
            noise_strength: 0.25,
            wander_strength: 0.3,
            wander_scale: 0.004,
            wander_rate: 0.25,
            flee_weight: 2.5,
            sim_speed: 1.0,
            energy_enabled: true,
            min_energy_speed: 0.5,
            energy_decay_rate: 0.01,
            min_escape_speed: 30.0,
        }
    }
}

impl SimulationConfig {
    /// Speed fraction allowed by the given energy level.
    #[inline]
    pub fn energy_factor(&self, energy: f32) -> f32 {
        if self.energy_enabled {
            self.min_energy_speed + (1.0 - self.min_energy_speed) * energy.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Effective max speed for an agent with the given panic and energy.
    #[inline]
    pub fn effective_max_speed(&self, panic: f32, energy: f32) -> f32 {
        self.max_speed * (1.0 + panic * PANIC_SPEED_BOOST) * self.energy_factor(energy)
    }

    /// Cosine of the half field-of-view angle.
    #[inline]
    pub fn fov_cos(&self) -> f32 {
        (self.field_of_view.to_radians() * 0.5).cos()
    }

    /// Copy with every value pulled into a usable range.
    pub fn sanitized(&self) -> Self {
        Self {
            max_speed: self.max_speed.max(0.0),
            max_force: self.max_force.max(0.0),
            perception_radius: self.perception_radius.max(1.0),
            separation_radius: self.separation_radius.max(0.0),
            field_of_view: self.field_of_view.clamp(0.0, 360.0),
            boundary_margin: self.boundary_margin.max(0.0),
            boundary_curve: self.boundary_curve.max(0.01),
            boundary_lookahead: self.boundary_lookahead.max(0.0),
            wall_damping_factor: self.wall_damping_factor.clamp(0.0, 1.0),
            sim_speed: self.sim_speed.max(0.0),
            min_energy_speed: self.min_energy_speed.clamp(0.0, 1.0),
            energy_decay_rate: self.energy_decay_rate.max(0.0),
            min_escape_speed: self.min_escape_speed.max(0.0),
            ..self.clone()
        }
    }
}

/// Constant wind with optional noise turbulence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindConfig {
    pub enabled: bool,
    /// Wind speed in world units per second.
    pub speed: f32,
    /// Direction in degrees, 0 = +x.
    pub direction: f32,
    /// 0 = steady, 1 = strongly gusting.
    pub turbulence: f32,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self { enabled: false, speed: 20.0, direction: 0.0, turbulence: 0.3 }
    }
}

/// How flashes propagate between oscillators.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CouplingMode {
    /// Each agent reacts to flashing neighbours inside `sync_radius`,
    /// attenuated by an inverse-square light falloff.
    #[default]
    Local,
    /// Each agent reacts to the population-wide flashing fraction.
    Global,
}

/// Firefly-style pulse-coupled oscillator parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FireflyConfig {
    /// When false phases still advance but no coupling is applied.
    pub enabled: bool,
    /// Flashes per second for an agent with natural frequency 1.0.
    pub base_frequency: f32,
    /// Half-width of the uniform jitter applied to natural frequencies.
    pub frequency_variation: f32,
    pub coupling_strength: f32,
    pub sync_radius: f32,
    /// Seconds of visible flash after each reset.
    pub flash_duration: f32,
    pub coupling_mode: CouplingMode,
}

impl Default for FireflyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_frequency: 0.8,
            frequency_variation: 0.1,
            coupling_strength: 0.5,
            sync_radius: 100.0,
            flash_duration: 0.25,
            coupling_mode: CouplingMode::Local,
        }
    }
}

/// Prey-side predator response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredatorConfig {
    /// When false predators are neither updated nor broadcast panic.
    pub enabled: bool,
    /// Base panic radius assigned to newly spawned predators.
    pub panic_radius: f32,
    /// Per-step multiplicative panic decay.
    pub panic_decay: f32,
}

impl Default for PredatorConfig {
    fn default() -> Self {
        Self { enabled: true, panic_radius: 150.0, panic_decay: 0.98 }
    }
}

/// Everything outside the flock itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub wind: WindConfig,
    pub firefly: FireflyConfig,
    pub predator: PredatorConfig,
}

impl EnvironmentConfig {
    /// Copy with every value pulled into a usable range.
    pub fn sanitized(&self) -> Self {
        Self {
            wind: WindConfig {
                speed: self.wind.speed.max(0.0),
                turbulence: self.wind.turbulence.clamp(0.0, 1.0),
                ..self.wind.clone()
            },
            firefly: FireflyConfig {
                base_frequency: self.firefly.base_frequency.max(0.0),
                frequency_variation: self.firefly.frequency_variation.clamp(0.0, 1.0),
                coupling_strength: self.firefly.coupling_strength.max(0.0),
                sync_radius: self.firefly.sync_radius.max(0.0),
                flash_duration: self.firefly.flash_duration.max(0.0),
                ..self.firefly.clone()
            },
            predator: PredatorConfig {
                panic_radius: self.predator.panic_radius.max(0.0),
                panic_decay: self.predator.panic_decay.clamp(0.0, 1.0),
                ..self.predator.clone()
            },
        }
    }
}
