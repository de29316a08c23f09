//! Exponential backoff with proportional jitter

use bulwark_config::RetryConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Backoff delay calculator
///
/// The delay before retry `n` (1-indexed) is
/// `min(max_delay, base_delay * multiplier^(n-1))`, then scaled by a factor
/// drawn uniformly from `[1 - jitter_fraction, 1 + jitter_fraction]`.
/// Seeded calculators with identical parameters produce identical sequences.
pub struct BackoffCalculator {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_fraction: f64,
    rng: Mutex<StdRng>,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_fraction: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            base_delay,
            max_delay,
            multiplier,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    /// Create a calculator from retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.base_delay,
            config.max_delay,
            config.backoff_multiplier,
            config.jitter_fraction,
            config.jitter_seed,
        )
    }

    /// Capped delay before jitter for a retry (1-indexed)
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = (retry - 1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Calculate the jittered delay for a retry (1-indexed)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let delay = self.nominal_delay(retry);

        if self.jitter_fraction > 0.0 && !delay.is_zero() {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    /// Infinite sequence of delays for retries 1, 2, 3, ...
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=u32::MAX).map(move |retry| self.calculate_delay(retry))
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let low = 1.0 - self.jitter_fraction;
        let high = 1.0 + self.jitter_fraction;
        let factor = self.rng.lock().gen_range(low..=high);

        let nanos = (delay.as_nanos() as f64 * factor).round();
        if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

impl std::fmt::Debug for BackoffCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffCalculator")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter_fraction", &self.jitter_fraction)
            .finish_non_exhaustive()
    }
}
