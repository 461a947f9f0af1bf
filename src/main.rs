//! Headless scenario runner.
//!
//! ```text
//! murmur [scenario.json]
//! murmur --write-default scenario.json
//! ```
//!
//! Runs the scenario for its configured duration at a fixed frame rate and
//! logs flock statistics periodically. Set `RUST_LOG` to change verbosity.

use std::path::{Path, PathBuf};
use std::time::Instant;

use murmur::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum ScenarioError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct PredatorSpawn {
    species: Species,
    position: [f32; 2],
}

impl Default for PredatorSpawn {
    fn default() -> Self {
        Self { species: Species::Hawk, position: [100.0, 100.0] }
    }
}

/// Everything needed to reproduce a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct ScenarioConfig {
    width: f32,
    height: f32,
    capacity: usize,
    birds: usize,
    seed: u64,
    /// Simulated seconds to run.
    duration: f32,
    /// Wall-clock frame length fed to the simulator.
    frame_dt: f32,
    /// Seconds between statistics log lines.
    report_interval: f32,
    mode: ExecutionMode,
    /// Try the GPU first and fall back to `mode` if it is unavailable.
    try_gpu: bool,
    predators: Vec<PredatorSpawn>,
    simulation: SimulationConfig,
    environment: EnvironmentConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            capacity: 4000,
            birds: 2000,
            seed: 42,
            duration: 30.0,
            frame_dt: 1.0 / 60.0,
            report_interval: 5.0,
            mode: ExecutionMode::Parallel,
            try_gpu: false,
            predators: vec![
                PredatorSpawn { species: Species::Falcon, position: [200.0, 150.0] },
                PredatorSpawn { species: Species::HarrisHawk, position: [1000.0, 600.0] },
                PredatorSpawn { species: Species::HarrisHawk, position: [1100.0, 550.0] },
            ],
            simulation: SimulationConfig::default(),
            environment: EnvironmentConfig::default(),
        }
    }
}

impl ScenarioConfig {
    fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ScenarioError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, path: &Path) -> Result<(), ScenarioError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ScenarioError::Io { path: path.to_path_buf(), source })
    }

    fn build(&self) -> Result<Simulator, ScenarioError> {
        let mut sim = Simulator::new(self.capacity, self.width, self.height, self.simulation.perception_radius)?
            .with_execution_mode(self.mode);
        sim.spawn(self.birds, &self.simulation, &self.environment, self.seed);

        if self.predators.iter().any(|p| p.species.hunts_in_packs()) {
            sim.set_pack_coordinator(Box::new(PackRoster::new()));
        }
        for p in &self.predators {
            sim.spawn_predator(p.species, Vec2::from(p.position));
        }

        if self.try_gpu {
            if let Err(e) = sim.enable_gpu() {
                warn!(error = %e, fallback = ?self.mode, "continuing on the CPU");
            }
        }
        Ok(sim)
    }
}

fn run(scenario: &ScenarioConfig) -> Result<(), ScenarioError> {
    let mut sim = scenario.build()?;
    info!(
        birds = sim.agents().count(),
        predators = sim.predators().len(),
        mode = ?sim.execution_mode(),
        "scenario started"
    );

    let started = Instant::now();
    let frames = (scenario.duration / scenario.frame_dt.max(1e-4)).ceil() as u64;
    let mut next_report = scenario.report_interval;

    for frame in 0..frames {
        sim.update(scenario.frame_dt, &scenario.simulation, &scenario.environment);

        let t = (frame + 1) as f32 * scenario.frame_dt;
        if scenario.report_interval > 0.0 && t >= next_report {
            next_report += scenario.report_interval;
            let stats = sim.stats();
            info!(
                t = format_args!("{t:.1}s"),
                speed = format_args!("{:.1}", stats.mean_speed),
                panic = format_args!("{:.3}", stats.mean_panic),
                energy = format_args!("{:.3}", stats.mean_energy),
                flashing = format_args!("{:.3}", stats.flashing_fraction),
                coherence = format_args!("{:.3}", stats.phase_coherence),
                "flock"
            );
            for p in sim.predators() {
                info!(id = p.id(), species = ?p.species(), state = ?p.state(), energy = format_args!("{:.2}", p.energy()), "predator");
            }
        }
    }

    let stats = sim.stats();
    info!(
        ticks = sim.tick(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        attempts = stats.hunts.attempts,
        successes = stats.hunts.successes,
        timeouts = stats.hunts.timeouts,
        success_rate = format_args!("{:.2}", stats.hunts.success_rate()),
        "scenario finished"
    );
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.as_slice() {
        [flag, path] if flag == "--write-default" => {
            ScenarioConfig::default().save(Path::new(path)).map(|()| info!(path = %path, "default scenario written"))
        }
        [path] => ScenarioConfig::load(Path::new(path)).and_then(|s| run(&s)),
        [] => run(&ScenarioConfig::default()),
        _ => {
            eprintln!("usage: murmur [scenario.json] | murmur --write-default <path>");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_scenario_uses_defaults() {
        let s: ScenarioConfig = serde_json::from_str(r#"{"birds": 10, "predators": []}"#).unwrap();
        assert_eq!(s.birds, 10);
        assert!(s.predators.is_empty());
        assert_eq!(s.width, 1280.0);
    }

    #[test]
    fn test_scenario_builds() {
        let s = ScenarioConfig { birds: 50, capacity: 40, ..Default::default() };
        let sim = s.build().unwrap();
        assert_eq!(sim.agents().count(), 40);
        assert_eq!(sim.predators().len(), 3);
        assert!(sim.pack_coordinator().is_some());
    }

    #[test]
    fn test_bad_world_is_rejected() {
        let s = ScenarioConfig { width: 0.0, ..Default::default() };
        assert!(matches!(s.build(), Err(ScenarioError::Config(_))));
    }
}
