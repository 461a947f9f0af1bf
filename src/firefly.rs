//! Pulse-coupled "firefly" oscillator synchronisation.
//!
//! Each agent carries a phase in `[0, 1)` advancing at
//! `base_frequency * natural_frequency` cycles per second. Reaching 1.0 is a
//! flash: the phase wraps (overflow carried) and glow intensity spikes.
//!
//! Observing a flashing neighbour advances an agent's own phase by
//! `coupling * phase^2 * falloff`. The quadratic phase-response curve makes
//! agents close to their own threshold respond most, so they get pulled
//! into the flash and clusters lock together over a few cycles.
//!
//! Two coupling strategies implement the same contract, chosen per run by
//! [`CouplingMode`]:
//!
//! - **Local**: scan spatial neighbours inside `sync_radius`, each flashing
//!   one contributing with inverse-square light falloff.
//! - **Global**: use the population-wide fraction currently flashing. Cheaper
//!   and position independent.
//!
//! Glow intensity is always derived from phase, never set directly.

use glam::Vec2;

use crate::config::{CouplingMode, FireflyConfig};
use crate::spatial::SpatialGrid;

/// Glow intensity above which an agent counts as flashing.
pub const FLASH_THRESHOLD: f32 = 0.8;
/// Glow right after the flash has faded.
pub const AMBIENT_MIN: f32 = 0.05;
/// Glow just before the next flash.
pub const AMBIENT_MAX: f32 = 0.2;
/// Per-neighbour gain of the local coupling.
pub const LOCAL_GAIN: f32 = 0.05;
/// Gain applied to the flashing fraction under global coupling.
pub const GLOBAL_GAIN: f32 = 1.0;
/// Cap on the coupling advance an agent can receive in one step.
pub const MAX_ADVANCE: f32 = 0.5;
/// Fraction of the flash window spent rising.
const RISE_FRACTION: f32 = 0.1;

/// Glow intensity for a phase, given the phase rate and flash duration.
///
/// Inside the flash window following a reset the glow rises fast then
/// decays linearly to the ambient level; outside it the ambient glow creeps
/// up slowly until the next flash.
pub fn glow_intensity(phase: f32, rate: f32, flash_duration: f32) -> f32 {
    let window = (flash_duration * rate).clamp(1e-4, 0.5);
    let value = if phase < window {
        let x = phase / window;
        if x < RISE_FRACTION {
            x / RISE_FRACTION
        } else {
            1.0 - (x - RISE_FRACTION) / (1.0 - RISE_FRACTION) * (1.0 - AMBIENT_MAX)
        }
    } else {
        AMBIENT_MIN + (AMBIENT_MAX - AMBIENT_MIN) * (phase - window) / (1.0 - window)
    };
    value.clamp(0.0, 1.0)
}

#[inline]
pub fn is_flashing(intensity: f32) -> bool {
    intensity > FLASH_THRESHOLD
}

/// Quadratic phase-response curve.
#[inline]
pub fn phase_response(phase: f32) -> f32 {
    phase * phase
}

/// Inverse-square light attenuation, 1.0 at zero distance.
#[inline]
pub fn light_falloff(dist_sq: f32, sync_radius: f32) -> f32 {
    let r0 = (sync_radius * 0.25).max(1e-3);
    1.0 / (1.0 + dist_sq / (r0 * r0))
}

/// Fraction of agents currently flashing.
pub fn flashing_fraction(intensity: &[f32]) -> f32 {
    if intensity.is_empty() {
        return 0.0;
    }
    let flashing = intensity.iter().filter(|&&v| is_flashing(v)).count();
    flashing as f32 / intensity.len() as f32
}

/// Kuramoto order parameter of the phases: 1 = lockstep, ~0 = spread out.
pub fn phase_coherence(phases: &[f32]) -> f32 {
    if phases.is_empty() {
        return 0.0;
    }
    let sum = phases
        .iter()
        .fold(Vec2::ZERO, |acc, &p| acc + Vec2::from_angle(p * std::f32::consts::TAU));
    sum.length() / phases.len() as f32
}

/// New oscillator state for one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OscillatorUpdate {
    pub phase: f32,
    pub intensity: f32,
}

/// Read-only inputs shared by every agent's oscillator step.
pub struct OscillatorContext<'a> {
    pub positions: &'a [Vec2],
    pub phases: &'a [f32],
    pub intensities: &'a [f32],
    pub natural_frequency: &'a [f32],
    pub grid: &'a SpatialGrid,
    pub config: &'a FireflyConfig,
    pub dt: f32,
    /// Flashing fraction of the snapshot, used by global coupling.
    pub flashing_fraction: f32,
}

impl<'a> OscillatorContext<'a> {
    /// Coupling advance agent `i` receives this step.
    pub fn coupling_advance(&self, i: usize) -> f32 {
        let cfg = self.config;
        if !cfg.enabled || cfg.coupling_strength <= 0.0 {
            return 0.0;
        }
        let prc = phase_response(self.phases[i]);
        let advance = match cfg.coupling_mode {
            CouplingMode::Local => {
                let pos = self.positions[i];
                let r_sq = cfg.sync_radius * cfg.sync_radius;
                let mut sum = 0.0;
                self.grid.for_each_candidate(pos, cfg.sync_radius, |j| {
                    if j == i || !is_flashing(self.intensities[j]) {
                        return;
                    }
                    let d_sq = self.positions[j].distance_squared(pos);
                    if d_sq < r_sq {
                        sum += light_falloff(d_sq, cfg.sync_radius);
                    }
                });
                cfg.coupling_strength * prc * LOCAL_GAIN * sum
            }
            CouplingMode::Global => cfg.coupling_strength * prc * GLOBAL_GAIN * self.flashing_fraction,
        };
        advance.min(MAX_ADVANCE)
    }

    /// Advance agent `i` by one step.
    pub fn step(&self, i: usize) -> OscillatorUpdate {
        let rate = self.config.base_frequency * self.natural_frequency[i];
        let next = self.phases[i] + rate * self.dt + self.coupling_advance(i);
        let mut phase = next.fract();
        if !(0.0..1.0).contains(&phase) {
            phase = 0.0;
        }
        OscillatorUpdate {
            phase,
            intensity: glow_intensity(phase, rate, self.config.flash_duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_intensity_shape() {
        let (rate, dur) = (1.0, 0.25);
        assert_eq!(glow_intensity(0.0, rate, dur), 0.0);
        // Peak at the end of the rise.
        assert!((glow_intensity(0.025, rate, dur) - 1.0).abs() < 1e-5);
        assert!(is_flashing(glow_intensity(0.03, rate, dur)));
        assert!(!is_flashing(glow_intensity(0.2, rate, dur)));
        // Ambient creeps upward and stays below the flash threshold.
        let a = glow_intensity(0.4, rate, dur);
        let b = glow_intensity(0.9, rate, dur);
        assert!(b > a);
        assert!(b <= AMBIENT_MAX + 1e-6);
    }

    #[test]
    fn test_intensity_always_in_unit_range() {
        for i in 0..1000 {
            let phase = i as f32 / 1000.0;
            for &(rate, dur) in &[(0.1, 0.1), (1.0, 0.25), (3.0, 2.0), (0.0, 0.0)] {
                let v = glow_intensity(phase, rate, dur);
                assert!((0.0..=1.0).contains(&v), "phase {phase} rate {rate} -> {v}");
            }
        }
    }

    #[test]
    fn test_light_falloff_decreases() {
        assert_eq!(light_falloff(0.0, 100.0), 1.0);
        assert!(light_falloff(100.0, 100.0) > light_falloff(2500.0, 100.0));
    }

    #[test]
    fn test_phase_coherence_bounds() {
        assert!((phase_coherence(&[0.3; 10]) - 1.0).abs() < 1e-5);
        assert!(phase_coherence(&[0.0, 0.5]) < 1e-5);
        // Wrap-around neighbours are close.
        assert!(phase_coherence(&[0.99, 0.01]) > 0.99);
    }

    fn cluster(n: usize, seed: u64) -> (Vec<Vec2>, Vec<f32>, Vec<f32>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let positions = (0..n)
            .map(|_| Vec2::new(500.0 + rng.gen_range(-15.0..15.0), 500.0 + rng.gen_range(-15.0..15.0)))
            .collect();
        let phases = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
        let freqs = (0..n).map(|_| 1.0 + rng.gen_range(-0.02..0.02)).collect();
        (positions, phases, freqs)
    }

    fn run(config: &FireflyConfig, steps: usize) -> (f32, f32) {
        let (positions, mut phases, freqs) = cluster(50, 11);
        let mut intensities: Vec<f32> = phases
            .iter()
            .zip(&freqs)
            .map(|(&p, &f)| glow_intensity(p, config.base_frequency * f, config.flash_duration))
            .collect();
        let mut grid = SpatialGrid::new(50.0, 1000.0, 1000.0).unwrap();
        grid.rebuild(&positions);

        let before = phase_coherence(&phases);
        for _ in 0..steps {
            let ctx = OscillatorContext {
                positions: &positions,
                phases: &phases,
                intensities: &intensities,
                natural_frequency: &freqs,
                grid: &grid,
                config,
                dt: 1.0 / 60.0,
                flashing_fraction: flashing_fraction(&intensities),
            };
            let updates: Vec<OscillatorUpdate> = (0..positions.len()).map(|i| ctx.step(i)).collect();
            for (i, u) in updates.into_iter().enumerate() {
                assert!((0.0..1.0).contains(&u.phase));
                assert!((0.0..=1.0).contains(&u.intensity));
                phases[i] = u.phase;
                intensities[i] = u.intensity;
            }
        }
        (before, phase_coherence(&phases))
    }

    #[test]
    fn test_local_coupling_synchronises_cluster() {
        let config = FireflyConfig { coupling_strength: 1.0, ..Default::default() };
        let (before, after) = run(&config, 500);
        assert!(after > before + 0.3, "coherence {before} -> {after}");
    }

    #[test]
    fn test_global_coupling_synchronises_cluster() {
        let config = FireflyConfig {
            coupling_strength: 1.0,
            coupling_mode: CouplingMode::Global,
            ..Default::default()
        };
        let (before, after) = run(&config, 500);
        assert!(after > before + 0.3, "coherence {before} -> {after}");
    }

    #[test]
    fn test_disabled_coupling_only_free_runs() {
        let config = FireflyConfig { enabled: false, ..Default::default() };
        let positions = vec![Vec2::new(10.0, 10.0), Vec2::new(11.0, 10.0)];
        let phases = vec![0.9, 0.03];
        let freqs = vec![1.0, 1.0];
        let intensities: Vec<f32> = phases.iter().map(|&p| glow_intensity(p, 0.8, 0.25)).collect();
        let mut grid = SpatialGrid::new(50.0, 100.0, 100.0).unwrap();
        grid.rebuild(&positions);
        let ctx = OscillatorContext {
            positions: &positions,
            phases: &phases,
            intensities: &intensities,
            natural_frequency: &freqs,
            grid: &grid,
            config: &config,
            dt: 0.1,
            flashing_fraction: flashing_fraction(&intensities),
        };
        assert_eq!(ctx.coupling_advance(0), 0.0);
        let u = ctx.step(0);
        assert!((u.phase - (0.9 + 0.08)).abs() < 1e-5);
    }

    #[test]
    fn test_overflow_is_carried() {
        let config = FireflyConfig { enabled: false, base_frequency: 1.0, ..Default::default() };
        let positions = vec![Vec2::ZERO];
        let phases = vec![0.95];
        let freqs = vec![1.0];
        let intensities = vec![0.1];
        let mut grid = SpatialGrid::new(50.0, 100.0, 100.0).unwrap();
        grid.rebuild(&positions);
        let ctx = OscillatorContext {
            positions: &positions,
            phases: &phases,
            intensities: &intensities,
            natural_frequency: &freqs,
            grid: &grid,
            config: &config,
            dt: 0.1,
            flashing_fraction: 0.0,
        };
        let u = ctx.step(0);
        assert!((u.phase - 0.05).abs() < 1e-5);
    }
}
