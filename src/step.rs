//! The per-agent step, shared by every execution path.
//!
//! A step has two phases separated by a hard barrier:
//!
//! 1. **Compute**: [`StepContext::step`] reads only the snapshot held by the
//!    context (store arrays, grid, configs) and returns an [`AgentUpdate`].
//! 2. **Write**: the simulator copies every update back into the store.
//!
//! No agent can observe another agent's write within the same step, so the
//! sequential loop and the rayon map produce identical results regardless of
//! processing order.

use glam::Vec2;

use crate::attractors::{attraction, Attractor};
use crate::config::{EnvironmentConfig, SimulationConfig, PANIC_FLOOR};
use crate::forces::{self, Neighbourhood, Threat};
use crate::spatial::SpatialGrid;

/// Fixed simulation step in seconds.
pub const FIXED_DT: f32 = 1.0 / 60.0;
/// Forces are tuned per 60 Hz frame.
pub const FORCE_SCALE: f32 = 60.0;
/// Heading is only refreshed above this speed.
pub const HEADING_MIN_SPEED: f32 = 0.1;
/// Normal velocity kept after bouncing off a wall.
pub const WALL_RESTITUTION: f32 = 0.8;
/// Tangential velocity kept while touching a wall.
pub const WALL_FRICTION: f32 = 0.98;
/// Inset from each world edge that agents are clamped to.
pub const EDGE_PADDING: f32 = 2.0;

/// New state for one agent after a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentUpdate {
    pub position: Vec2,
    pub velocity: Vec2,
    pub heading: f32,
    pub panic: f32,
    pub energy: f32,
    pub density: f32,
}

/// Read-only snapshot every agent's step is computed from.
pub struct StepContext<'a> {
    pub positions: &'a [Vec2],
    pub velocities: &'a [Vec2],
    pub headings: &'a [f32],
    pub panic: &'a [f32],
    pub energy: &'a [f32],
    pub grid: &'a SpatialGrid,
    pub sim: &'a SimulationConfig,
    pub env: &'a EnvironmentConfig,
    pub world: Vec2,
    pub threats: &'a [Threat],
    pub attractors: &'a [Attractor],
    pub dt: f32,
    pub tick: u32,
    /// Simulated seconds, used to drift the noise fields.
    pub time: f32,
}

impl<'a> StepContext<'a> {
    #[inline]
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    /// Total steering force on agent `i` and the neighbourhood it saw.
    pub fn force(&self, i: usize) -> (Vec2, Neighbourhood) {
        let sim = self.sim;
        let position = self.positions[i];
        let velocity = self.velocities[i];
        let heading = self.headings[i];

        let n = Neighbourhood::gather(i, self.positions, self.velocities, heading, self.grid, sim);
        let wall_distance = forces::wall_distance(position, self.world);

        let flocking = forces::alignment(&n, velocity, sim) * sim.alignment_weight
            + forces::cohesion(&n, position, velocity, sim) * sim.cohesion_weight
            + forces::separation(&n, velocity, sim) * sim.separation_weight;

        let force = flocking * forces::wall_damping(wall_distance, sim)
            + forces::boundary(position, velocity, self.world, sim)
            + forces::wall_jitter(i as u32, self.tick, wall_distance, sim)
            + forces::wind(position, self.time, &self.env.wind)
            + forces::wander(position, heading, self.time, sim)
            + forces::flee(position, velocity, self.threats, sim)
            + attraction(position, self.attractors);

        (force, n)
    }

    /// Full step for agent `i`: force, decay, integration, collision.
    pub fn step(&self, i: usize) -> AgentUpdate {
        let (force, n) = self.force(i);
        integrate(
            AgentState {
                position: self.positions[i],
                velocity: self.velocities[i],
                heading: self.headings[i],
                panic: self.panic[i],
                energy: self.energy[i],
            },
            force,
            n.density(),
            self.sim,
            self.env.predator.panic_decay,
            self.world,
            self.dt,
        )
    }
}

/// Kinematic state consumed by [`integrate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub heading: f32,
    pub panic: f32,
    pub energy: f32,
}

/// Advance one agent by `dt` under `force`.
pub fn integrate(
    agent: AgentState,
    force: Vec2,
    density: f32,
    sim: &SimulationConfig,
    panic_decay: f32,
    world: Vec2,
    dt: f32,
) -> AgentUpdate {
    let prior_speed = agent.velocity.length();

    let mut panic = (agent.panic * panic_decay).clamp(0.0, 1.0);
    if panic < PANIC_FLOOR {
        panic = 0.0;
    }

    let mut energy = agent.energy;
    if sim.energy_enabled {
        let effort = if sim.max_speed > 0.0 { (prior_speed / sim.max_speed).min(1.0) } else { 0.0 };
        energy = (energy - sim.energy_decay_rate * (0.5 + 0.5 * effort) * dt).clamp(0.0, 1.0);
    }

    let max_speed = sim.effective_max_speed(panic, energy);
    let mut velocity = (agent.velocity + force * dt * FORCE_SCALE).clamp_length_max(max_speed);
    let mut position = agent.position + velocity * dt * sim.sim_speed;

    let lo = Vec2::splat(EDGE_PADDING);
    let hi = (world - lo).max(lo);
    let mut hit = false;

    if position.x < lo.x || position.x > hi.x {
        let outward = if position.x < lo.x { -1.0 } else { 1.0 };
        position.x = position.x.clamp(lo.x, hi.x);
        if velocity.x * outward > 0.0 {
            velocity.x = -velocity.x * WALL_RESTITUTION;
        }
        velocity.y *= WALL_FRICTION;
        hit = true;
    }
    if position.y < lo.y || position.y > hi.y {
        let outward = if position.y < lo.y { -1.0 } else { 1.0 };
        position.y = position.y.clamp(lo.y, hi.y);
        if velocity.y * outward > 0.0 {
            velocity.y = -velocity.y * WALL_RESTITUTION;
        }
        velocity.x *= WALL_FRICTION;
        hit = true;
    }

    if hit {
        let escape = sim.min_escape_speed.min(max_speed);
        let speed = velocity.length();
        if speed < escape {
            velocity = if speed > forces::MIN_DISTANCE {
                velocity / speed * escape
            } else {
                (world * 0.5 - position).normalize_or_zero() * escape
            };
        }
    }

    let heading = if velocity.length() > HEADING_MIN_SPEED {
        velocity.y.atan2(velocity.x)
    } else {
        agent.heading
    };

    AgentUpdate { position, velocity, heading, panic, energy, density }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_sim() -> SimulationConfig {
        SimulationConfig {
            alignment_weight: 0.0,
            cohesion_weight: 0.0,
            separation_weight: 0.0,
            wander_strength: 0.0,
            noise_strength: 0.0,
            ..Default::default()
        }
    }

    fn agent(position: Vec2, velocity: Vec2) -> AgentState {
        AgentState { position, velocity, heading: 0.0, panic: 0.0, energy: 1.0 }
    }

    const WORLD: Vec2 = Vec2::new(1000.0, 800.0);

    #[test]
    fn test_free_flight() {
        let sim = quiet_sim();
        let mut a = agent(Vec2::new(100.0, 100.0), Vec2::new(10.0, 0.0));
        a.panic = 0.5;
        let u = integrate(a, Vec2::ZERO, 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert!((u.position.x - (100.0 + 10.0 / 60.0)).abs() < 1e-4);
        assert!((u.position.y - 100.0).abs() < 1e-6);
        assert_eq!(u.heading, 0.0);
        assert!((u.panic - 0.49).abs() < 1e-6);
    }

    #[test]
    fn test_panic_snaps_to_zero() {
        let sim = quiet_sim();
        let mut a = agent(Vec2::new(100.0, 100.0), Vec2::ZERO);
        a.panic = 0.0101;
        let u = integrate(a, Vec2::ZERO, 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert_eq!(u.panic, 0.0);
    }

    #[test]
    fn test_panic_stays_bounded_when_decay_exceeds_one() {
        let sim = quiet_sim();
        let mut a = agent(Vec2::new(400.0, 400.0), Vec2::new(50.0, 0.0));
        a.panic = 0.9;
        for _ in 0..10 {
            let u = integrate(a, Vec2::ZERO, 0.0, &sim, 1.5, WORLD, FIXED_DT);
            assert!((0.0..=1.0).contains(&u.panic), "panic {}", u.panic);
            assert!(u.velocity.length() <= sim.effective_max_speed(1.0, u.energy) + 1e-3);
            a = AgentState { position: u.position, velocity: u.velocity, heading: u.heading, panic: u.panic, energy: u.energy };
        }
        assert_eq!(a.panic, 1.0);
    }

    #[test]
    fn test_speed_clamped_to_effective_max() {
        let sim = quiet_sim();
        let mut a = agent(Vec2::new(500.0, 400.0), Vec2::new(140.0, 0.0));
        a.energy = 0.2;
        let u = integrate(a, Vec2::new(1000.0, 0.0), 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert!(u.velocity.length() <= sim.effective_max_speed(u.panic, u.energy) + 1e-3);
    }

    #[test]
    fn test_energy_drains_faster_at_speed() {
        let sim = quiet_sim();
        let slow = integrate(agent(Vec2::splat(400.0), Vec2::ZERO), Vec2::ZERO, 0.0, &sim, 0.98, WORLD, 1.0);
        let fast = integrate(agent(Vec2::splat(400.0), Vec2::new(150.0, 0.0)), Vec2::ZERO, 0.0, &sim, 0.98, WORLD, 1.0);
        assert!((1.0 - slow.energy - sim.energy_decay_rate * 0.5).abs() < 1e-6);
        assert!((1.0 - fast.energy - sim.energy_decay_rate).abs() < 1e-6);
    }

    #[test]
    fn test_wall_reflection() {
        let sim = quiet_sim();
        let u = integrate(agent(Vec2::new(3.0, 400.0), Vec2::new(-120.0, 50.0)), Vec2::ZERO, 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert_eq!(u.position.x, EDGE_PADDING);
        assert!((u.velocity.x - 96.0).abs() < 1e-3);
        assert!((u.velocity.y - 49.0).abs() < 1e-3);
    }

    #[test]
    fn test_escape_speed_after_collision() {
        let sim = quiet_sim();
        // Stalled against the right wall, pointing into it.
        let u = integrate(agent(Vec2::new(999.0, 400.0), Vec2::new(1.0, 0.0)), Vec2::ZERO, 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert_eq!(u.position.x, WORLD.x - EDGE_PADDING);
        assert!((u.velocity.length() - sim.min_escape_speed).abs() < 1e-3);
        assert!(u.velocity.x < 0.0);
    }

    #[test]
    fn test_heading_kept_when_nearly_stopped() {
        let sim = quiet_sim();
        let mut a = agent(Vec2::splat(400.0), Vec2::new(0.01, 0.0));
        a.heading = 1.25;
        let u = integrate(a, Vec2::ZERO, 0.0, &sim, 0.98, WORLD, FIXED_DT);
        assert_eq!(u.heading, 1.25);
    }

    #[test]
    fn test_context_step_matches_free_flight() {
        let sim = quiet_sim();
        let env = EnvironmentConfig::default();
        let positions = vec![Vec2::new(100.0, 100.0)];
        let velocities = vec![Vec2::new(10.0, 0.0)];
        let mut grid = SpatialGrid::new(sim.perception_radius, WORLD.x, WORLD.y).unwrap();
        grid.rebuild(&positions);
        let ctx = StepContext {
            positions: &positions,
            velocities: &velocities,
            headings: &[0.0],
            panic: &[0.5],
            energy: &[1.0],
            grid: &grid,
            sim: &sim,
            env: &env,
            world: WORLD,
            threats: &[],
            attractors: &[],
            dt: FIXED_DT,
            tick: 0,
            time: 0.0,
        };
        let (force, n) = ctx.force(0);
        assert_eq!(force, Vec2::ZERO);
        assert_eq!(n.count, 0);
        let u = ctx.step(0);
        assert!((u.position.x - (100.0 + 10.0 / 60.0)).abs() < 1e-4);
        assert_eq!(u.density, 0.0);
    }
}
