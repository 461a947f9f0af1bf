//! Steering terms that make up the per-agent force.
//!
//! Every term is a pure function of a read-only snapshot, so the same code
//! serves the sequential loop and the rayon map. The WGSL kernel in
//! [`crate::gpu`] mirrors these functions line for line.
//!
//! Flocking terms (alignment, cohesion, separation) are computed from one
//! shared [`Neighbourhood`] accumulated in a single pass over the grid
//! candidates.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::Vec2;

use crate::config::{SimulationConfig, WindConfig, WIND_FORCE_SCALE};
use crate::noise::{agent_seed, noise2, rand01};
use crate::spatial::SpatialGrid;

/// Neighbour count at which density saturates.
pub const DENSITY_SATURATION: f32 = 20.0;
/// Lower bound of the cohesion density-adaptation factor.
pub const MIN_DENSITY_FACTOR: f32 = 0.3;
/// Fraction of the boundary margin in which wall jitter is injected.
pub const WALL_JITTER_ZONE: f32 = 0.3;
/// Spatial frequency of the wind turbulence field.
pub const WIND_NOISE_SCALE: f32 = 0.003;
/// Temporal drift of the wind turbulence field.
pub const WIND_NOISE_RATE: f32 = 0.2;
/// Offset decorrelating the wind magnitude sample from the angle sample.
pub const WIND_MAGNITUDE_OFFSET: Vec2 = Vec2::new(31.7, 17.3);
/// Hash stream used by wall jitter.
pub const STREAM_JITTER: u32 = 1;

/// Distances below this are treated as coincident and skipped.
pub(crate) const MIN_DISTANCE: f32 = 1e-4;

/// A point prey flee from, typically an active predator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threat {
    pub position: Vec2,
    /// Effective panic radius of the threat.
    pub radius: f32,
}

#[inline]
pub fn limit(v: Vec2, max: f32) -> Vec2 {
    v.clamp_length_max(max.max(0.0))
}

/// Reynolds steering: `limit(normalize(direction) * speed - velocity, max_force)`.
///
/// Returns zero when `direction` is degenerate.
#[inline]
pub fn steer_towards(direction: Vec2, velocity: Vec2, speed: f32, max_force: f32) -> Vec2 {
    let dir = direction.normalize_or_zero();
    if dir == Vec2::ZERO {
        return Vec2::ZERO;
    }
    limit(dir * speed - velocity, max_force)
}

#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Cohesion scale for an agent with `count` neighbours.
#[inline]
pub fn density_factor(count: u32) -> f32 {
    (1.0 - count as f32 / DENSITY_SATURATION).max(MIN_DENSITY_FACTOR)
}

/// Sums gathered from the neighbours of one agent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Neighbourhood {
    /// Neighbours within the perception radius, all around.
    pub count: u32,
    pub align_sum: Vec2,
    pub align_weight: f32,
    pub centroid_sum: Vec2,
    pub centroid_weight: f32,
    pub separation_sum: Vec2,
    pub separation_count: u32,
}

impl Neighbourhood {
    /// Fold one candidate into the sums. Candidates outside the perception
    /// radius or coincident with the agent are ignored.
    #[inline]
    pub fn accumulate(
        &mut self,
        position: Vec2,
        forward: Vec2,
        other_position: Vec2,
        other_velocity: Vec2,
        sim: &SimulationConfig,
        fov_cos: f32,
    ) {
        let offset = other_position - position;
        let d = offset.length();
        if d <= MIN_DISTANCE || d >= sim.perception_radius {
            return;
        }
        self.count += 1;
        let weight = 1.0 - d / sim.perception_radius;

        self.centroid_sum += other_position * weight;
        self.centroid_weight += weight;

        if forward.dot(offset / d) >= fov_cos {
            self.align_sum += other_velocity * weight;
            self.align_weight += weight;
        }

        if d < sim.separation_radius {
            self.separation_sum += (-offset / d) / (d * d);
            self.separation_count += 1;
        }
    }

    /// Gather the neighbourhood of agent `index` from the grid.
    pub fn gather(
        index: usize,
        positions: &[Vec2],
        velocities: &[Vec2],
        heading: f32,
        grid: &SpatialGrid,
        sim: &SimulationConfig,
    ) -> Self {
        let position = positions[index];
        let forward = Vec2::from_angle(heading);
        let fov_cos = sim.fov_cos();
        let mut n = Self::default();
        grid.for_each_candidate(position, sim.perception_radius, |j| {
            if j != index {
                n.accumulate(position, forward, positions[j], velocities[j], sim, fov_cos);
            }
        });
        n
    }

    /// Local density in `[0, 1]`.
    #[inline]
    pub fn density(&self) -> f32 {
        (self.count as f32 / DENSITY_SATURATION).min(1.0)
    }
}

pub fn alignment(n: &Neighbourhood, velocity: Vec2, sim: &SimulationConfig) -> Vec2 {
    if n.align_weight <= 0.0 {
        return Vec2::ZERO;
    }
    steer_towards(n.align_sum / n.align_weight, velocity, sim.max_speed, sim.max_force)
}

pub fn cohesion(n: &Neighbourhood, position: Vec2, velocity: Vec2, sim: &SimulationConfig) -> Vec2 {
    if n.centroid_weight <= 0.0 {
        return Vec2::ZERO;
    }
    let centroid = n.centroid_sum / n.centroid_weight;
    steer_towards(centroid - position, velocity, sim.max_speed, sim.max_force) * density_factor(n.count)
}

pub fn separation(n: &Neighbourhood, velocity: Vec2, sim: &SimulationConfig) -> Vec2 {
    if n.separation_count == 0 {
        return Vec2::ZERO;
    }
    let away = n.separation_sum / n.separation_count as f32;
    steer_towards(away, velocity, sim.max_speed, sim.max_force)
}

/// Distance from `position` to the closest world edge.
#[inline]
pub fn wall_distance(position: Vec2, world: Vec2) -> f32 {
    position.x.min(world.x - position.x).min(position.y).min(world.y - position.y)
}

/// Strength of one edge's push for an agent `distance` away from it.
#[inline]
fn edge_factor(distance: f32, margin: f32, curve: f32) -> f32 {
    if distance <= 0.0 {
        1.0
    } else if distance < margin {
        smoothstep(1.0 - distance / margin).powf(curve)
    } else {
        0.0
    }
}

/// Boundary avoidance steering.
///
/// Each edge is tested at the nearer of the current and the look-ahead
/// position. The pushes of all four edges are combined into one inward
/// direction whose desired speed scales with the deepest penetration.
pub fn boundary(position: Vec2, velocity: Vec2, world: Vec2, sim: &SimulationConfig) -> Vec2 {
    let margin = sim.boundary_margin;
    if margin <= 0.0 {
        return Vec2::ZERO;
    }
    let ahead = position + velocity * sim.boundary_lookahead;
    let curve = sim.boundary_curve;

    let left = edge_factor(position.x.min(ahead.x), margin, curve);
    let right = edge_factor((world.x - position.x).min(world.x - ahead.x), margin, curve);
    let top = edge_factor(position.y.min(ahead.y), margin, curve);
    let bottom = edge_factor((world.y - position.y).min(world.y - ahead.y), margin, curve);

    let depth = left.max(right).max(top).max(bottom);
    if depth <= 0.0 {
        return Vec2::ZERO;
    }
    let push = Vec2::new(left - right, top - bottom);
    steer_towards(push, velocity, sim.max_speed * depth, sim.max_force) * sim.boundary_force
}

/// Multiplier on the flocking terms near a wall: `wall_damping_factor` at
/// the wall, rising linearly to 1 at the margin edge.
#[inline]
pub fn wall_damping(wall_distance: f32, sim: &SimulationConfig) -> f32 {
    let margin = sim.boundary_margin;
    if margin <= 0.0 || wall_distance >= margin {
        return 1.0;
    }
    let t = (wall_distance / margin).clamp(0.0, 1.0);
    sim.wall_damping_factor + (1.0 - sim.wall_damping_factor) * t
}

/// Random kick for agents hugging a wall.
pub fn wall_jitter(index: u32, tick: u32, wall_distance: f32, sim: &SimulationConfig) -> Vec2 {
    if sim.boundary_margin <= 0.0 || wall_distance >= WALL_JITTER_ZONE * sim.boundary_margin {
        return Vec2::ZERO;
    }
    let angle = rand01(agent_seed(index, tick, STREAM_JITTER)) * TAU;
    Vec2::from_angle(angle) * sim.max_force * sim.noise_strength
}

/// Wind force at `position`, optionally gusting with coherent noise.
pub fn wind(position: Vec2, time: f32, wind: &WindConfig) -> Vec2 {
    if !wind.enabled || wind.speed <= 0.0 {
        return Vec2::ZERO;
    }
    let mut angle = wind.direction.to_radians();
    let mut magnitude = wind.speed * WIND_FORCE_SCALE;
    if wind.turbulence > 0.0 {
        let sample = position * WIND_NOISE_SCALE + Vec2::splat(time * WIND_NOISE_RATE);
        angle += noise2(sample) * wind.turbulence * FRAC_PI_2;
        magnitude *= 1.0 + noise2(sample + WIND_MAGNITUDE_OFFSET) * wind.turbulence * 0.5;
    }
    Vec2::from_angle(angle) * magnitude
}

/// Smooth heading drift sampled from a noise field over position and time.
pub fn wander(position: Vec2, heading: f32, time: f32, sim: &SimulationConfig) -> Vec2 {
    if sim.wander_strength <= 0.0 {
        return Vec2::ZERO;
    }
    let sample = position * sim.wander_scale + Vec2::splat(time * sim.wander_rate);
    let angle = heading + noise2(sample) * PI;
    Vec2::from_angle(angle) * sim.wander_strength
}

/// Flee steering away from every threat in range, each weighted by proximity.
pub fn flee(position: Vec2, velocity: Vec2, threats: &[Threat], sim: &SimulationConfig) -> Vec2 {
    let mut force = Vec2::ZERO;
    for threat in threats {
        let d = position.distance(threat.position);
        if d <= MIN_DISTANCE || d >= threat.radius {
            continue;
        }
        let proximity = 1.0 - d / threat.radius;
        force += steer_towards(position - threat.position, velocity, sim.max_speed, sim.max_force)
            * sim.flee_weight
            * proximity;
    }
    force
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Vec2 {
        Vec2::new(1000.0, 1000.0)
    }

    #[test]
    fn test_steer_towards_limits_force() {
        let f = steer_towards(Vec2::X, Vec2::ZERO, 100.0, 5.0);
        assert!((f.length() - 5.0).abs() < 1e-5);
        assert_eq!(steer_towards(Vec2::ZERO, Vec2::X, 100.0, 5.0), Vec2::ZERO);
    }

    #[test]
    fn test_density_factor_floor() {
        assert_eq!(density_factor(0), 1.0);
        assert!((density_factor(10) - 0.5).abs() < 1e-6);
        assert_eq!(density_factor(20), MIN_DENSITY_FACTOR);
        assert_eq!(density_factor(200), MIN_DENSITY_FACTOR);
    }

    #[test]
    fn test_accumulate_skips_out_of_range_and_coincident() {
        let sim = SimulationConfig::default();
        let mut n = Neighbourhood::default();
        let p = Vec2::new(100.0, 100.0);
        n.accumulate(p, Vec2::X, p, Vec2::X, &sim, sim.fov_cos());
        n.accumulate(p, Vec2::X, p + Vec2::new(sim.perception_radius + 1.0, 0.0), Vec2::X, &sim, sim.fov_cos());
        assert_eq!(n, Neighbourhood::default());

        n.accumulate(p, Vec2::X, p + Vec2::new(10.0, 0.0), Vec2::Y, &sim, sim.fov_cos());
        assert_eq!(n.count, 1);
        assert_eq!(n.separation_count, 1);
        assert!(n.separation_sum.x < 0.0);
    }

    #[test]
    fn test_alignment_respects_field_of_view() {
        let sim = SimulationConfig { field_of_view: 90.0, ..Default::default() };
        let mut n = Neighbourhood::default();
        let p = Vec2::new(100.0, 100.0);
        // Directly behind a +x facing agent.
        n.accumulate(p, Vec2::X, p - Vec2::new(30.0, 0.0), Vec2::Y * 50.0, &sim, sim.fov_cos());
        assert_eq!(n.count, 1);
        assert_eq!(n.align_weight, 0.0);
        assert_eq!(alignment(&n, Vec2::X, &sim), Vec2::ZERO);
        // Cohesion still sees it.
        assert!(cohesion(&n, p, Vec2::ZERO, &sim).x < 0.0);
    }

    #[test]
    fn test_separation_pushes_apart() {
        let sim = SimulationConfig::default();
        let mut n = Neighbourhood::default();
        let p = Vec2::new(100.0, 100.0);
        n.accumulate(p, Vec2::X, p + Vec2::new(5.0, 0.0), Vec2::ZERO, &sim, sim.fov_cos());
        let f = separation(&n, Vec2::ZERO, &sim);
        assert!(f.x < 0.0);
        assert!(f.length() <= sim.max_force + 1e-5);
    }

    #[test]
    fn test_cohesion_never_grows_past_saturation() {
        let sim = SimulationConfig::default();
        let p = Vec2::new(500.0, 500.0);
        let target = Vec2::new(530.0, 500.0);
        let mut previous = f32::MAX;
        for count in 20..60 {
            let mut n = Neighbourhood::default();
            for k in 0..count {
                let jitter = Vec2::new(0.0, (k % 3) as f32 - 1.0);
                n.accumulate(p, Vec2::X, target + jitter, Vec2::ZERO, &sim, sim.fov_cos());
            }
            let magnitude = cohesion(&n, p, Vec2::ZERO, &sim).length();
            assert!(magnitude <= previous + 1e-5);
            previous = magnitude;
        }
    }

    #[test]
    fn test_boundary_zero_in_interior() {
        let sim = SimulationConfig::default();
        assert_eq!(boundary(Vec2::new(500.0, 500.0), Vec2::new(10.0, 0.0), world(), &sim), Vec2::ZERO);
    }

    #[test]
    fn test_boundary_pushes_inward_near_each_edge() {
        let sim = SimulationConfig::default();
        let w = world();
        assert!(boundary(Vec2::new(10.0, 500.0), Vec2::ZERO, w, &sim).x > 0.0);
        assert!(boundary(Vec2::new(990.0, 500.0), Vec2::ZERO, w, &sim).x < 0.0);
        assert!(boundary(Vec2::new(500.0, 10.0), Vec2::ZERO, w, &sim).y > 0.0);
        assert!(boundary(Vec2::new(500.0, 990.0), Vec2::ZERO, w, &sim).y < 0.0);
    }

    #[test]
    fn test_boundary_lookahead_triggers_early() {
        let sim = SimulationConfig::default();
        let p = Vec2::new(120.0, 500.0);
        assert_eq!(boundary(p, Vec2::new(10.0, 0.0), world(), &sim), Vec2::ZERO);
        // Heading for the left wall fast enough that the look-ahead is inside the margin.
        assert!(boundary(p, Vec2::new(-150.0, 0.0), world(), &sim).x > 0.0);
    }

    #[test]
    fn test_boundary_deeper_is_stronger() {
        let sim = SimulationConfig { max_force: 1000.0, ..Default::default() };
        let shallow = boundary(Vec2::new(70.0, 500.0), Vec2::ZERO, world(), &sim).length();
        let deep = boundary(Vec2::new(10.0, 500.0), Vec2::ZERO, world(), &sim).length();
        assert!(deep > shallow);
    }

    #[test]
    fn test_wall_damping_profile() {
        let sim = SimulationConfig::default();
        assert!((wall_damping(0.0, &sim) - sim.wall_damping_factor).abs() < 1e-6);
        assert_eq!(wall_damping(sim.boundary_margin, &sim), 1.0);
        let mid = wall_damping(sim.boundary_margin * 0.5, &sim);
        assert!(mid > sim.wall_damping_factor && mid < 1.0);
    }

    #[test]
    fn test_wall_jitter_only_near_wall() {
        let sim = SimulationConfig::default();
        assert_eq!(wall_jitter(3, 7, sim.boundary_margin, &sim), Vec2::ZERO);
        let j = wall_jitter(3, 7, 1.0, &sim);
        assert!((j.length() - sim.max_force * sim.noise_strength).abs() < 1e-4);
        assert_eq!(j, wall_jitter(3, 7, 1.0, &sim));
    }

    #[test]
    fn test_steady_wind() {
        let cfg = WindConfig { enabled: true, speed: 20.0, direction: 90.0, turbulence: 0.0 };
        let f = wind(Vec2::new(10.0, 10.0), 3.0, &cfg);
        assert!(f.x.abs() < 1e-6);
        assert!((f.y - 20.0 * WIND_FORCE_SCALE).abs() < 1e-6);
        assert_eq!(wind(Vec2::ZERO, 0.0, &WindConfig::default()), Vec2::ZERO);
    }

    #[test]
    fn test_turbulent_wind_is_bounded() {
        let cfg = WindConfig { enabled: true, speed: 20.0, direction: 0.0, turbulence: 1.0 };
        for i in 0..200 {
            let f = wind(Vec2::new(i as f32 * 13.0, i as f32 * 7.0), i as f32 * 0.1, &cfg);
            assert!(f.length() <= 20.0 * WIND_FORCE_SCALE * 1.5 + 1e-5);
        }
    }

    #[test]
    fn test_wander_magnitude() {
        let sim = SimulationConfig::default();
        let f = wander(Vec2::new(123.0, 456.0), 0.3, 2.0, &sim);
        assert!((f.length() - sim.wander_strength).abs() < 1e-5);
    }

    #[test]
    fn test_flee_points_away_and_fades() {
        let sim = SimulationConfig::default();
        let threat = Threat { position: Vec2::new(500.0, 500.0), radius: 100.0 };
        let near = flee(Vec2::new(520.0, 500.0), Vec2::ZERO, &[threat], &sim);
        let far = flee(Vec2::new(590.0, 500.0), Vec2::ZERO, &[threat], &sim);
        assert!(near.x > 0.0);
        assert!(near.length() > far.length());
        assert_eq!(flee(Vec2::new(700.0, 500.0), Vec2::ZERO, &[threat], &sim), Vec2::ZERO);
    }
}
