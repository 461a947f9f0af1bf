//! # Murmuration Demo
//!
//! A starling flock at dusk: flashes drift into sync while a peregrine and
//! a pair of Harris's hawks work the edges. Prints a coarse density map of
//! the flock every two simulated seconds.
//!
//! Run with: `cargo run --example murmuration --release [birds] [--gpu]`

use murmur::prelude::*;
use tracing_subscriber::EnvFilter;

const WIDTH: f32 = 1600.0;
const HEIGHT: f32 = 900.0;
const COLS: usize = 80;
const ROWS: usize = 24;

fn density_map(agents: &AgentStore) -> String {
    let mut cells = vec![0u32; COLS * ROWS];
    let mut lit = vec![false; COLS * ROWS];
    for (p, &glow) in agents.positions().iter().zip(agents.glow_intensity()) {
        let cx = ((p.x / WIDTH) * COLS as f32).clamp(0.0, (COLS - 1) as f32) as usize;
        let cy = ((p.y / HEIGHT) * ROWS as f32).clamp(0.0, (ROWS - 1) as f32) as usize;
        cells[cy * COLS + cx] += 1;
        lit[cy * COLS + cx] |= murmur::firefly::is_flashing(glow);
    }

    let mut out = String::with_capacity((COLS + 1) * ROWS);
    for row in 0..ROWS {
        for col in 0..COLS {
            let i = row * COLS + col;
            out.push(match (cells[i], lit[i]) {
                (0, _) => ' ',
                (_, true) => '*',
                (1..=2, _) => '.',
                (3..=6, _) => 'o',
                _ => '#',
            });
        }
        out.push('\n');
    }
    out
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let birds: usize = args.iter().find_map(|a| a.parse().ok()).unwrap_or(3_000);
    let want_gpu = args.iter().any(|a| a == "--gpu");

    let sim = SimulationConfig { max_speed: 170.0, cohesion_weight: 1.0, ..Default::default() };
    let env = EnvironmentConfig {
        wind: WindConfig { enabled: true, speed: 15.0, direction: 20.0, turbulence: 0.5 },
        firefly: FireflyConfig { coupling_strength: 0.8, sync_radius: 120.0, ..Default::default() },
        ..Default::default()
    };

    let mut flock = match Simulator::new(birds, WIDTH, HEIGHT, sim.perception_radius) {
        Ok(f) => f.with_execution_mode(ExecutionMode::Parallel),
        Err(e) => {
            eprintln!("cannot build flock: {e}");
            std::process::exit(1);
        }
    };
    flock.spawn(birds, &sim, &env, 2024);
    flock.set_pack_coordinator(Box::new(PackRoster::new()));
    flock.spawn_predator(Species::Falcon, Vec2::new(150.0, 120.0));
    flock.spawn_predator(Species::HarrisHawk, Vec2::new(1450.0, 780.0));
    flock.spawn_predator(Species::HarrisHawk, Vec2::new(1500.0, 700.0));

    if want_gpu {
        if let Err(e) = flock.enable_gpu() {
            println!("GPU unavailable ({e}), staying on the CPU");
        }
    }

    let frame = 1.0 / 60.0;
    for second in 1..=20 {
        for _ in 0..60 {
            flock.update(frame, &sim, &env);
        }

        if second % 2 == 0 {
            let stats = flock.stats();
            println!("\n=== t = {second:>2}s ===");
            print!("{}", density_map(flock.agents()));
            println!(
                "speed {:6.1}  panic {:.2}  flashing {:4.1}%  sync {:.2}",
                stats.mean_speed,
                stats.mean_panic,
                stats.flashing_fraction * 100.0,
                stats.phase_coherence
            );
            for p in flock.predators() {
                println!(
                    "  {:?} #{}: {:?} energy {:.2} at ({:.0}, {:.0})",
                    p.species(),
                    p.id(),
                    p.state(),
                    p.energy(),
                    p.position().x,
                    p.position().y
                );
            }
        }
    }

    let hunts = flock.stats().hunts;
    println!(
        "\nhunts: {} attempts, {} caught ({:.0}%), {} chases abandoned",
        hunts.attempts,
        hunts.successes,
        hunts.success_rate() * 100.0,
        hunts.timeouts
    );
}
