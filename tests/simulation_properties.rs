//! Integration tests for the flock-wide guarantees of the simulator.
//!
//! These drive [`Simulator`] through its public API only and check the
//! properties every execution mode must hold after any number of steps.

use murmur::firefly::phase_coherence;
use murmur::forces::{cohesion, density_factor, Neighbourhood, MIN_DENSITY_FACTOR};
use murmur::prelude::*;
use murmur::step::{EDGE_PADDING, FIXED_DT};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const WIDTH: f32 = 800.0;
const HEIGHT: f32 = 600.0;

fn flock(count: usize, mode: ExecutionMode) -> (Simulator, SimulationConfig, EnvironmentConfig) {
    let sim = SimulationConfig::default();
    let env = EnvironmentConfig {
        wind: WindConfig { enabled: true, ..Default::default() },
        ..Default::default()
    };
    let mut s = Simulator::new(count, WIDTH, HEIGHT, sim.perception_radius)
        .unwrap()
        .with_execution_mode(mode);
    s.spawn(count, &sim, &env, 1234);
    (s, sim, env)
}

// ============================================================================
// Per-agent bounds
// ============================================================================

#[test]
fn test_speed_never_exceeds_effective_max() {
    let (mut s, sim, env) = flock(400, ExecutionMode::Parallel);
    s.apply_panic_at_position(400.0, 300.0, 200.0, 1.0);
    s.add_attractor(Attractor::attract(Vec2::new(600.0, 200.0), 3.0, 300.0, 2.0));

    for _ in 0..300 {
        s.step(&sim, &env);
        let agents = s.agents();
        for i in 0..agents.count() {
            let limit = sim.effective_max_speed(agents.panic_levels()[i], agents.energy()[i]);
            let speed = agents.velocities()[i].length();
            assert!(speed <= limit + 1e-3, "agent {i}: speed {speed} > {limit}");
        }
    }
}

#[test]
fn test_phase_and_intensity_stay_in_range() {
    let (mut s, sim, mut env) = flock(300, ExecutionMode::Sequential);
    env.firefly.coupling_strength = 1.0;
    env.firefly.base_frequency = 3.0;

    for _ in 0..400 {
        s.step(&sim, &env);
        let agents = s.agents();
        for (&phase, &glow) in agents.glow_phase().iter().zip(agents.glow_intensity()) {
            assert!((0.0..1.0).contains(&phase), "phase {phase}");
            assert!((0.0..=1.0).contains(&glow), "intensity {glow}");
        }
    }
}

#[test]
fn test_agents_stay_inside_world() {
    let sim = SimulationConfig { max_speed: 400.0, boundary_force: 0.0, ..Default::default() };
    let env = EnvironmentConfig::default();
    let mut s = Simulator::new(300, WIDTH, HEIGHT, sim.perception_radius).unwrap();
    s.spawn(300, &sim, &env, 9);
    s.spawn_predator(Species::Hawk, Vec2::new(400.0, 300.0));

    for _ in 0..600 {
        s.step(&sim, &env);
        for p in s.agents().positions() {
            assert!(p.x >= EDGE_PADDING && p.x <= WIDTH - EDGE_PADDING, "x out of bounds: {p}");
            assert!(p.y >= EDGE_PADDING && p.y <= HEIGHT - EDGE_PADDING, "y out of bounds: {p}");
        }
    }
}

#[test]
fn test_cohesion_does_not_grow_with_crowding() {
    let sim = SimulationConfig::default();
    let position = Vec2::new(100.0, 100.0);
    let velocity = Vec2::new(5.0, 0.0);
    let mut rng = SmallRng::seed_from_u64(3);

    // Each neighbour sits on the same side so the centroid direction is stable.
    let mut n = Neighbourhood::default();
    let mut last = f32::INFINITY;
    for count in 1..=60 {
        let other = position + Vec2::new(rng.gen_range(10.0..40.0), rng.gen_range(-5.0..5.0));
        n.accumulate(position, Vec2::X, other, Vec2::ZERO, &sim, sim.fov_cos());
        assert_eq!(n.count, count);

        let magnitude = cohesion(&n, position, velocity, &sim).length();
        if count >= 20 {
            assert!(magnitude <= last + 1e-4, "count {count}: {magnitude} > {last}");
            last = magnitude;
        }
        assert!(density_factor(count) >= MIN_DENSITY_FACTOR);
    }
}

// ============================================================================
// Execution paths
// ============================================================================

fn run_mode(mode: ExecutionMode, steps: usize) -> Simulator {
    let (mut s, sim, env) = flock(500, mode);
    s.spawn_predator(Species::Falcon, Vec2::new(100.0, 100.0));
    s.add_attractor(Attractor::repel(Vec2::new(400.0, 300.0), 2.0, 150.0, 1.0));
    for _ in 0..steps {
        s.step(&sim, &env);
    }
    s
}

fn assert_close(a: &Simulator, b: &Simulator, pos_tol: f32, vel_tol: f32) {
    let (a, b) = (a.agents(), b.agents());
    assert_eq!(a.count(), b.count());
    for i in 0..a.count() {
        let dp = a.positions()[i].distance(b.positions()[i]);
        let dv = a.velocities()[i].distance(b.velocities()[i]);
        assert!(dp <= pos_tol, "agent {i}: position differs by {dp}");
        assert!(dv <= vel_tol, "agent {i}: velocity differs by {dv}");
    }
}

#[test]
fn test_sequential_and_parallel_agree() {
    let seq = run_mode(ExecutionMode::Sequential, 120);
    let par = run_mode(ExecutionMode::Parallel, 120);
    assert_close(&seq, &par, 1e-3, 1e-3);
    assert_eq!(seq.agents().glow_phase(), par.agents().glow_phase());
    assert_eq!(seq.predators()[0].position(), par.predators()[0].position());
}

#[test]
fn test_gpu_matches_cpu_when_available() {
    let (mut gpu, sim, env) = flock(500, ExecutionMode::Sequential);
    if let Err(e) = gpu.enable_gpu() {
        eprintln!("skipping GPU comparison: {e}");
        return;
    }
    let (mut cpu, _, _) = flock(500, ExecutionMode::Sequential);

    gpu.step(&sim, &env);
    cpu.step(&sim, &env);
    assert_eq!(gpu.execution_mode(), ExecutionMode::Gpu);
    assert_close(&gpu, &cpu, 1e-2, 1e-1);
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_agent_moves_one_step() {
    let sim = SimulationConfig {
        boundary_margin: 50.0,
        wander_strength: 0.0,
        energy_enabled: false,
        ..Default::default()
    };
    let env = EnvironmentConfig::default();
    let mut s = Simulator::new(1, 1000.0, 1000.0, sim.perception_radius).unwrap();
    s.spawn_seeds(
        [AgentSeed {
            position: Vec2::new(100.0, 100.0),
            velocity: Vec2::new(10.0, 0.0),
            panic: 0.5,
            ..Default::default()
        }],
        &env,
    );

    s.step(&sim, &env);

    let agents = s.agents();
    let p = agents.positions()[0];
    assert!((p.x - (100.0 + 10.0 * FIXED_DT)).abs() < 1e-4, "x = {}", p.x);
    assert!((p.y - 100.0).abs() < 1e-4, "y = {}", p.y);
    assert_eq!(agents.headings()[0], 0.0);
    assert!((agents.panic_levels()[0] - 0.49).abs() < 1e-6);
}

#[test]
fn test_tight_cluster_synchronises() {
    let sim = SimulationConfig { max_speed: 2.0, wander_strength: 0.0, ..Default::default() };
    let env = EnvironmentConfig {
        firefly: FireflyConfig { coupling_strength: 1.0, ..Default::default() },
        ..Default::default()
    };
    let mut rng = SmallRng::seed_from_u64(5);
    let seeds: Vec<AgentSeed> = (0..50)
        .map(|_| AgentSeed {
            position: Vec2::new(500.0 + rng.gen_range(-15.0..15.0), 500.0 + rng.gen_range(-15.0..15.0)),
            glow_phase: rng.gen_range(0.0..1.0),
            natural_frequency: 1.0 + rng.gen_range(-0.1..0.1),
            ..Default::default()
        })
        .collect();

    let mut s = Simulator::new(50, 1000.0, 1000.0, sim.perception_radius).unwrap();
    s.spawn_seeds(seeds, &env);
    let before = phase_coherence(s.agents().glow_phase());

    for _ in 0..500 {
        s.step(&sim, &env);
    }
    let after = s.stats().phase_coherence;
    assert!(after > before + 0.25, "coherence {before} -> {after}");
}

#[test]
fn test_frame_time_is_spent_in_fixed_steps() {
    let (mut s, sim, env) = flock(50, ExecutionMode::Sequential);

    // A long stall runs at most five steps and drops the rest.
    assert_eq!(s.update(0.5, &sim, &env), 5);
    assert!(s.clock().dropped() > 0.0);

    assert_eq!(s.update(FIXED_DT * 0.5, &sim, &env), 0);
    assert_eq!(s.update(FIXED_DT * 0.5, &sim, &env), 1);
    assert_eq!(s.tick(), 6);
}

#[test]
fn test_stats_track_population() {
    let (mut s, sim, env) = flock(200, ExecutionMode::Parallel);
    s.step(&sim, &env);
    let stats = s.stats();
    assert_eq!(stats.agents, 200);
    assert!(stats.mean_speed > 0.0 && stats.mean_speed <= sim.max_speed * 1.5);
    assert!((0.0..=1.0).contains(&stats.mean_energy));
    assert!((0.0..=1.0).contains(&stats.phase_coherence));
}
