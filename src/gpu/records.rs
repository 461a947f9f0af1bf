//! Plain-old-data records uploaded to the flock kernel.
//!
//! Layouts mirror the WGSL structs declared in [`super::kernel`].

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::step::{AgentUpdate, StepContext};

/// One agent as seen by the kernel. 32 bytes, matching `struct Agent`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuAgent {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub heading: f32,
    pub panic: f32,
    pub energy: f32,
    pub density: f32,
}

impl From<GpuAgent> for AgentUpdate {
    fn from(a: GpuAgent) -> Self {
        Self {
            position: Vec2::from(a.position),
            velocity: Vec2::from(a.velocity),
            heading: a.heading,
            panic: a.panic,
            energy: a.energy,
            density: a.density,
        }
    }
}

/// Per-step uniforms, matching `struct Params`. 144 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuParams {
    pub world: [f32; 2],
    pub count: u32,
    pub tick: u32,
    pub dt: f32,
    pub time: f32,
    pub max_speed: f32,
    pub max_force: f32,
    pub perception_radius: f32,
    pub separation_radius: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub separation_weight: f32,
    pub fov_cos: f32,
    pub boundary_margin: f32,
    pub boundary_force: f32,
    pub boundary_curve: f32,
    pub boundary_lookahead: f32,
    pub wall_damping_factor: f32,
    pub noise_strength: f32,
    pub wander_strength: f32,
    pub wander_scale: f32,
    pub wander_rate: f32,
    pub flee_weight: f32,
    pub sim_speed: f32,
    pub energy_enabled: u32,
    pub min_energy_speed: f32,
    pub energy_decay_rate: f32,
    pub min_escape_speed: f32,
    pub panic_decay: f32,
    pub wind_enabled: u32,
    pub wind_speed: f32,
    /// Radians.
    pub wind_direction: f32,
    pub wind_turbulence: f32,
    pub threat_count: u32,
    pub attractor_count: u32,
}

impl GpuParams {
    pub fn from_context(ctx: &StepContext<'_>, threat_count: u32, attractor_count: u32) -> Self {
        let sim = ctx.sim;
        let wind = &ctx.env.wind;
        Self {
            world: ctx.world.to_array(),
            count: ctx.count() as u32,
            tick: ctx.tick,
            dt: ctx.dt,
            time: ctx.time,
            max_speed: sim.max_speed,
            max_force: sim.max_force,
            perception_radius: sim.perception_radius,
            separation_radius: sim.separation_radius,
            alignment_weight: sim.alignment_weight,
            cohesion_weight: sim.cohesion_weight,
            separation_weight: sim.separation_weight,
            fov_cos: sim.fov_cos(),
            boundary_margin: sim.boundary_margin,
            boundary_force: sim.boundary_force,
            boundary_curve: sim.boundary_curve,
            boundary_lookahead: sim.boundary_lookahead,
            wall_damping_factor: sim.wall_damping_factor,
            noise_strength: sim.noise_strength,
            wander_strength: sim.wander_strength,
            wander_scale: sim.wander_scale,
            wander_rate: sim.wander_rate,
            flee_weight: sim.flee_weight,
            sim_speed: sim.sim_speed,
            energy_enabled: u32::from(sim.energy_enabled),
            min_energy_speed: sim.min_energy_speed,
            energy_decay_rate: sim.energy_decay_rate,
            min_escape_speed: sim.min_escape_speed,
            panic_decay: ctx.env.predator.panic_decay,
            wind_enabled: u32::from(wind.enabled),
            wind_speed: wind.speed,
            wind_direction: wind.direction.to_radians(),
            wind_turbulence: wind.turbulence,
            threat_count,
            attractor_count,
        }
    }
}
