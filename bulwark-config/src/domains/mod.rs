//! Domain-specific configuration modules

pub mod circuit_breaker;
pub mod logging;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main Bulwark configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BulwarkConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Sections inherited by every dependency that does not set its own
    #[serde(default)]
    pub defaults: DependencyConfig,

    /// Per-dependency configuration keyed by dependency name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

/// Resilience settings for one logical downstream dependency.
///
/// Unset sections mean "not used" for `defaults`, and "inherit from defaults"
/// for a named dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DependencyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<retry::RetryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<circuit_breaker::CircuitBreakerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<rate_limiter::RateLimiterConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<timeout::TimeoutConfig>,
}

impl DependencyConfig {
    /// Fill every unset section from `defaults`
    pub fn merged_with(&self, defaults: &DependencyConfig) -> DependencyConfig {
        DependencyConfig {
            retry: self.retry.clone().or_else(|| defaults.retry.clone()),
            circuit_breaker: self
                .circuit_breaker
                .clone()
                .or_else(|| defaults.circuit_breaker.clone()),
            rate_limiter: self
                .rate_limiter
                .clone()
                .or_else(|| defaults.rate_limiter.clone()),
            timeout: self.timeout.clone().or_else(|| defaults.timeout.clone()),
        }
    }
}

impl Validatable for DependencyConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(ref retry) = self.retry {
            retry.validate()?;
        }
        if let Some(ref breaker) = self.circuit_breaker {
            breaker.validate()?;
        }
        if let Some(ref limiter) = self.rate_limiter {
            limiter.validate()?;
        }
        if let Some(ref timeout) = self.timeout {
            timeout.validate()?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "dependency"
    }
}

impl BulwarkConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.logging.validate()?;
        self.defaults.validate()?;

        for (name, dependency) in &self.dependencies {
            validate_required_string(name, "dependency name", "dependencies")?;
            dependency.validate()?;
        }

        Ok(())
    }

    /// Effective configuration for a named dependency, with defaults applied.
    ///
    /// Unknown names resolve to the defaults alone.
    pub fn dependency(&self, name: &str) -> DependencyConfig {
        match self.dependencies.get(name) {
            Some(dependency) => dependency.merged_with(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = BulwarkConfig {
            defaults: DependencyConfig {
                retry: Some(retry::RetryConfig::default()),
                circuit_breaker: Some(circuit_breaker::CircuitBreakerConfig::default()),
                rate_limiter: Some(rate_limiter::RateLimiterConfig::default()),
                timeout: Some(timeout::TimeoutConfig::default()),
            },
            ..Default::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
