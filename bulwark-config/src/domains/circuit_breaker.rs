//! Circuit breaker configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_positive_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time an open circuit waits before admitting trial calls
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Successful trial calls needed to close a half-open circuit.
    /// Also bounds the number of concurrent trial calls.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 3,
        }
    }
}

impl Validatable for CircuitBreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.failure_threshold, "failure_threshold", self.domain_name())?;
        validate_positive_duration(self.reset_timeout, "reset_timeout", self.domain_name())?;
        validate_positive(
            self.half_open_success_threshold,
            "half_open_success_threshold",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "circuit_breaker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CircuitBreakerConfig {
            half_open_success_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_reset_timeout() {
        let config = CircuitBreakerConfig {
            reset_timeout: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.domain(), Some("circuit_breaker"));
    }
}
