//! Retry configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_greater_than, validate_positive, validate_positive_duration, validate_range,
    Validatable,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound applied before jitter
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor between consecutive retries
    pub backoff_multiplier: f64,

    /// Fraction of the computed delay used as the jitter band, 0.0 to 1.0
    pub jitter_fraction: f64,

    /// Seed for the jitter generator; unseeded policies draw from entropy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_seed: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.2,
            jitter_seed: None,
        }
    }
}

impl Validatable for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;
        validate_positive_duration(self.base_delay, "base_delay", self.domain_name())?;

        if self.max_delay < self.base_delay {
            return Err(self.validation_error(format!(
                "max_delay ({:?}) must not be smaller than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }

        validate_greater_than(
            self.backoff_multiplier,
            1.0,
            "backoff_multiplier",
            self.domain_name(),
        )?;
        validate_range(
            self.jitter_fraction,
            0.0,
            1.0,
            "jitter_fraction",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_base_delay() {
        let config = RetryConfig {
            base_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_max_below_base() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_growing_multiplier() {
        for multiplier in [1.0, 0.5, f64::NAN] {
            let config = RetryConfig {
                backoff_multiplier: multiplier,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {}", multiplier);
        }
    }

    #[test]
    fn test_rejects_jitter_out_of_range() {
        for jitter in [-0.1, 1.5] {
            let config = RetryConfig {
                jitter_fraction: jitter,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {}", jitter);
        }
    }

    #[test]
    fn test_humantime_durations() {
        let config: RetryConfig = serde_yaml::from_str(
            "max_attempts: 4\nbase_delay: 250ms\nmax_delay: 5s\n",
        )
        .unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 2.0);
    }
}
