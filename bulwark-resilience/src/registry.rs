//! Per-dependency guard instances built from configuration
//!
//! Each logical downstream dependency gets one circuit breaker and one rate
//! limiter, shared by every caller that looks it up by name.

use bulwark_config::{BulwarkConfig, ConfigResult, DependencyConfig};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::clock::{default_clock, Clock};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::timeout::TimeoutGuard;

/// The configured guards for one dependency. Unconfigured sections are `None`.
#[derive(Debug, Clone)]
pub struct DependencyGuards {
    pub retry: Option<RetryPolicy>,
    pub circuit_breaker: Option<CircuitBreaker>,
    pub rate_limiter: Option<RateLimiter>,
    pub timeout: Option<TimeoutGuard>,
}

impl DependencyGuards {
    /// Build guards named after the dependency
    pub fn from_config(
        name: &str,
        config: &DependencyConfig,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        let retry = config.retry.clone().map(RetryPolicy::new).transpose()?;
        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|c| CircuitBreaker::with_clock(name, c, clock.clone()))
            .transpose()?;
        let rate_limiter = config
            .rate_limiter
            .clone()
            .map(|c| RateLimiter::with_clock(name, c, clock.clone()))
            .transpose()?;
        let timeout = config
            .timeout
            .as_ref()
            .map(TimeoutGuard::from_config)
            .transpose()?;

        Ok(Self {
            retry,
            circuit_breaker,
            rate_limiter,
            timeout,
        })
    }

    /// Fresh executor for the retry policy, if one is configured
    pub fn retry_executor(&self) -> Option<RetryExecutor> {
        self.retry.clone().map(RetryExecutor::new)
    }
}

/// Registry of guards keyed by dependency name.
///
/// Names missing from the configuration get guards built from the defaults
/// on first lookup; each such name still gets its own breaker and limiter.
#[derive(Debug)]
pub struct ResilienceRegistry {
    defaults: DependencyConfig,
    clock: Arc<dyn Clock>,
    guards: RwLock<BTreeMap<String, Arc<DependencyGuards>>>,
}

impl ResilienceRegistry {
    /// Build guards for every configured dependency
    pub fn from_config(config: &BulwarkConfig) -> ConfigResult<Self> {
        Self::with_clock(config, default_clock())
    }

    pub fn with_clock(config: &BulwarkConfig, clock: Arc<dyn Clock>) -> ConfigResult<Self> {
        config.validate_all()?;

        let mut guards = BTreeMap::new();
        for name in config.dependencies.keys() {
            let resolved = config.dependency(name);
            let built = DependencyGuards::from_config(name, &resolved, clock.clone())?;
            guards.insert(name.clone(), Arc::new(built));
        }

        log::info!("Resilience registry built for {} dependencies", guards.len());

        Ok(Self {
            defaults: config.defaults.clone(),
            clock,
            guards: RwLock::new(guards),
        })
    }

    /// Register or replace the guards for `name`
    pub fn insert(&self, name: impl Into<String>, guards: DependencyGuards) {
        self.guards.write().insert(name.into(), Arc::new(guards));
    }

    /// Guards for `name`, building them from the defaults on first use
    pub fn dependency(&self, name: &str) -> ConfigResult<Arc<DependencyGuards>> {
        if let Some(existing) = self.guards.read().get(name) {
            return Ok(existing.clone());
        }

        let mut guards = self.guards.write();
        if let Some(existing) = guards.get(name) {
            return Ok(existing.clone());
        }

        log::debug!("Building default guards for dependency '{}'", name);
        let built = Arc::new(DependencyGuards::from_config(
            name,
            &self.defaults,
            self.clock.clone(),
        )?);
        guards.insert(name.to_string(), built.clone());
        Ok(built)
    }

    /// Breaker for `name`; `Ok(None)` when no breaker is configured
    pub fn breaker(&self, name: &str) -> ConfigResult<Option<CircuitBreaker>> {
        Ok(self.dependency(name)?.circuit_breaker.clone())
    }

    pub fn limiter(&self, name: &str) -> ConfigResult<Option<RateLimiter>> {
        Ok(self.dependency(name)?.rate_limiter.clone())
    }

    pub fn retry_policy(&self, name: &str) -> ConfigResult<Option<RetryPolicy>> {
        Ok(self.dependency(name)?.retry.clone())
    }

    pub fn retry_executor(&self, name: &str) -> ConfigResult<Option<RetryExecutor>> {
        Ok(self.dependency(name)?.retry_executor())
    }

    pub fn timeout(&self, name: &str) -> ConfigResult<Option<TimeoutGuard>> {
        Ok(self.dependency(name)?.timeout)
    }

    /// Names with guards built so far
    pub fn dependency_names(&self) -> Vec<String> {
        self.guards.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::clock::ManualClock;
    use crate::error::ResilienceError;
    use std::time::Duration;

    const CONFIG: &str = r#"
defaults:
  retry:
    max_attempts: 4
    base_delay: 200ms
  circuit_breaker:
    failure_threshold: 2
    reset_timeout: 30s
dependencies:
  alpaca:
    rate_limiter:
      capacity: 200
      refill_rate: 3.3
    timeout:
      duration: 10s
  tableau:
    circuit_breaker:
      failure_threshold: 7
"#;

    fn registry() -> ResilienceRegistry {
        let config: BulwarkConfig = serde_yaml::from_str(CONFIG).unwrap();
        ResilienceRegistry::with_clock(&config, Arc::new(ManualClock::new())).unwrap()
    }

    #[test]
    fn test_named_dependencies_merge_defaults() {
        let registry = registry();
        assert_eq!(registry.dependency_names(), vec!["alpaca", "tableau"]);

        let alpaca = registry.dependency("alpaca").unwrap();
        assert_eq!(alpaca.retry.as_ref().unwrap().max_attempts(), 4);
        assert_eq!(alpaca.rate_limiter.as_ref().unwrap().capacity(), 200.0);
        assert_eq!(alpaca.timeout.unwrap().duration(), Duration::from_secs(10));
        assert_eq!(
            alpaca
                .circuit_breaker
                .as_ref()
                .unwrap()
                .config()
                .failure_threshold,
            2
        );

        let tableau = registry.breaker("tableau").unwrap().unwrap();
        assert_eq!(tableau.config().failure_threshold, 7);
        assert_eq!(tableau.name(), "tableau");
        assert!(registry.limiter("tableau").unwrap().is_none());
        assert!(registry.timeout("tableau").unwrap().is_none());
    }

    #[test]
    fn test_lookups_share_breaker_state() {
        let registry = registry();

        let first = registry.breaker("alpaca").unwrap().unwrap();
        first.record_failure();
        first.record_failure();

        let second = registry.breaker("alpaca").unwrap().unwrap();
        assert_eq!(second.state(), CircuitState::Open);
        let result: Result<(), ResilienceError<&str>> = second.call_blocking(|| Ok(()));
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[test]
    fn test_unknown_dependencies_get_own_default_guards() {
        let registry = registry();

        let vault = registry.breaker("vault").unwrap().unwrap();
        vault.record_failure();
        vault.record_failure();
        assert!(vault.is_open());

        let s3 = registry.breaker("s3").unwrap().unwrap();
        assert_eq!(s3.state(), CircuitState::Closed);
        assert!(registry.limiter("s3").unwrap().is_none());
        assert!(registry.retry_executor("s3").unwrap().is_some());
        assert_eq!(
            registry.dependency_names(),
            vec!["alpaca", "s3", "tableau", "vault"]
        );
    }

    #[test]
    fn test_insert_replaces_guards() {
        let registry = registry();
        registry.insert(
            "alpaca",
            DependencyGuards {
                retry: None,
                circuit_breaker: None,
                rate_limiter: None,
                timeout: Some(TimeoutGuard::new(Duration::from_secs(1)).unwrap()),
            },
        );

        assert!(registry.breaker("alpaca").unwrap().is_none());
        assert_eq!(
            registry.timeout("alpaca").unwrap().unwrap().duration(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_build_error_reaches_caller() {
        let registry = ResilienceRegistry {
            defaults: DependencyConfig {
                retry: None,
                circuit_breaker: Some(bulwark_config::CircuitBreakerConfig {
                    failure_threshold: 0,
                    ..Default::default()
                }),
                rate_limiter: None,
                timeout: None,
            },
            clock: Arc::new(ManualClock::new()),
            guards: RwLock::new(BTreeMap::new()),
        };

        let err = registry.breaker("vault").unwrap_err();
        assert_eq!(err.domain(), Some("circuit_breaker"));
        assert!(registry.limiter("vault").is_err());
        assert!(registry.dependency_names().is_empty());
    }

    #[test]
    fn test_invalid_dependency_rejected() {
        let config: BulwarkConfig = serde_yaml::from_str(
            r#"
dependencies:
  vault:
    retry:
      backoff_multiplier: 1.0
"#,
        )
        .unwrap();

        assert!(ResilienceRegistry::from_config(&config).is_err());
    }
}
