//! Fixed-timestep accumulator.
//!
//! Real frame time is banked in an accumulator and spent in whole
//! [`FIXED_DT`](crate::step::FIXED_DT) steps. At most `max_steps` steps run
//! per frame; anything left beyond that is dropped so a slow frame cannot
//! trigger an ever-growing catch-up.
//!
//! # Example
//!
//! ```ignore
//! use murmur::time::FixedTimestep;
//!
//! let mut clock = FixedTimestep::new(1.0 / 60.0, 5);
//!
//! // In your frame loop:
//! let steps = clock.advance(frame_dt);
//! for _ in 0..steps {
//!     // step the simulation once
//! }
//! ```

use tracing::trace;

/// Default catch-up cap per frame.
pub const MAX_STEPS_PER_TICK: u32 = 5;

/// Accumulates real time and hands out whole fixed steps.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    /// Length of one step in seconds.
    step: f32,
    /// Maximum steps handed out per `advance` call.
    max_steps: u32,
    /// Banked time not yet spent on a step.
    accumulator: f32,
    /// Total steps handed out since creation or reset.
    step_count: u64,
    /// Total real time discarded by the catch-up cap.
    dropped: f32,
}

impl FixedTimestep {
    /// Create a clock with the given step length and catch-up cap.
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step: step.max(f32::EPSILON),
            max_steps: max_steps.max(1),
            accumulator: 0.0,
            step_count: 0,
            dropped: 0.0,
        }
    }

    /// Bank `real_dt` seconds and return how many steps to run now.
    ///
    /// Negative or non-finite input counts as zero. May return 0 when less
    /// than one step of time has been banked.
    pub fn advance(&mut self, real_dt: f32) -> u32 {
        let dt = if real_dt.is_finite() { real_dt.max(0.0) } else { 0.0 };
        self.accumulator += dt;

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if self.accumulator >= self.step {
            trace!(discarded = self.accumulator, "catch-up cap reached, dropping remainder");
            self.dropped += self.accumulator;
            self.accumulator = 0.0;
        }
        self.step_count += u64::from(steps);
        steps
    }

    /// Length of one step in seconds.
    #[inline]
    pub fn step(&self) -> f32 {
        self.step
    }

    #[inline]
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Total steps handed out.
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated seconds represented by the steps handed out.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.step_count as f64 * f64::from(self.step)
    }

    /// Banked time waiting for the next step.
    #[inline]
    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    /// Real time discarded by the catch-up cap.
    #[inline]
    pub fn dropped(&self) -> f32 {
        self.dropped
    }

    /// Forget all banked time and counters.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.step_count = 0;
        self.dropped = 0.0;
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(crate::step::FIXED_DT, MAX_STEPS_PER_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_new() {
        let clock = FixedTimestep::new(DT, 5);
        assert_eq!(clock.step_count(), 0);
        assert_eq!(clock.pending(), 0.0);
        assert_eq!(clock.max_steps(), 5);
    }

    #[test]
    fn test_accumulates_until_a_full_step() {
        let mut clock = FixedTimestep::new(DT, 5);
        assert_eq!(clock.advance(DT * 0.6), 0);
        assert_eq!(clock.advance(DT * 0.6), 1);
        assert!((clock.pending() - DT * 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_multiple_steps_per_frame() {
        let mut clock = FixedTimestep::new(DT, 5);
        assert_eq!(clock.advance(DT * 3.5), 3);
        assert_eq!(clock.step_count(), 3);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut clock = FixedTimestep::new(DT, 5);
        assert_eq!(clock.advance(1.0), 5);
        // The remainder is discarded, not carried.
        assert_eq!(clock.pending(), 0.0);
        assert!(clock.dropped() > 0.9);
        assert_eq!(clock.advance(0.0), 0);
    }

    #[test]
    fn test_bad_input_ignored() {
        let mut clock = FixedTimestep::new(DT, 5);
        assert_eq!(clock.advance(-1.0), 0);
        assert_eq!(clock.advance(f32::NAN), 0);
        assert_eq!(clock.advance(f32::INFINITY), 0);
        assert_eq!(clock.pending(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut clock = FixedTimestep::default();
        clock.advance(0.1);
        clock.reset();
        assert_eq!(clock.step_count(), 0);
        assert_eq!(clock.pending(), 0.0);
    }
}
