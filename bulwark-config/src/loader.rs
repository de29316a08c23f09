//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::BulwarkConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "BULWARK".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a file with environment overrides.
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as YAML.
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BulwarkConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.finish(serde_json::from_str(&content)?)
        } else {
            self.from_yaml_str(&content)
        }
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<BulwarkConfig> {
        self.finish(serde_yaml::from_str(content)?)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<BulwarkConfig> {
        self.finish(BulwarkConfig::default())
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<BulwarkConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn finish(&self, mut config: BulwarkConfig) -> ConfigResult<BulwarkConfig> {
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_retry_overrides(config)?;
        self.apply_circuit_breaker_overrides(config)?;
        self.apply_rate_limiter_overrides(config)?;
        self.apply_timeout_overrides(config)?;
        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.parse_env::<LogLevel>("LOG_LEVEL")? {
            config.level = level;
        }

        if let Some(format) = self.parse_env::<LogFormat>("LOG_FORMAT")? {
            config.format = format;
        }

        Ok(())
    }

    /// Apply retry overrides to the defaults section
    fn apply_retry_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        let max_attempts: Option<u32> = self.parse_env("RETRY_MAX_ATTEMPTS")?;
        let base_delay = self.duration_env("RETRY_BASE_DELAY")?;

        if max_attempts.is_none() && base_delay.is_none() {
            return Ok(());
        }

        let retry = config.defaults.retry.get_or_insert_with(Default::default);
        if let Some(max_attempts) = max_attempts {
            retry.max_attempts = max_attempts;
        }
        if let Some(base_delay) = base_delay {
            retry.base_delay = base_delay;
        }

        Ok(())
    }

    /// Apply circuit breaker overrides to the defaults section
    fn apply_circuit_breaker_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        let failure_threshold: Option<u32> = self.parse_env("CIRCUIT_FAILURE_THRESHOLD")?;
        let reset_timeout = self.duration_env("CIRCUIT_RESET_TIMEOUT")?;

        if failure_threshold.is_none() && reset_timeout.is_none() {
            return Ok(());
        }

        let breaker = config
            .defaults
            .circuit_breaker
            .get_or_insert_with(Default::default);
        if let Some(failure_threshold) = failure_threshold {
            breaker.failure_threshold = failure_threshold;
        }
        if let Some(reset_timeout) = reset_timeout {
            breaker.reset_timeout = reset_timeout;
        }

        Ok(())
    }

    /// Apply rate limiter overrides to the defaults section
    fn apply_rate_limiter_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        let capacity: Option<u32> = self.parse_env("RATE_LIMIT_CAPACITY")?;
        let refill_rate: Option<f64> = self.parse_env("RATE_LIMIT_REFILL_RATE")?;

        if capacity.is_none() && refill_rate.is_none() {
            return Ok(());
        }

        let limiter = config
            .defaults
            .rate_limiter
            .get_or_insert_with(Default::default);
        if let Some(capacity) = capacity {
            limiter.capacity = capacity;
        }
        if let Some(refill_rate) = refill_rate {
            limiter.refill_rate = refill_rate;
        }

        Ok(())
    }

    /// Apply timeout overrides to the defaults section
    fn apply_timeout_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        if let Some(duration) = self.duration_env("TIMEOUT")? {
            config
                .defaults
                .timeout
                .get_or_insert_with(Default::default)
                .duration = duration;
        }
        Ok(())
    }

    /// Read `<PREFIX>_<name>` and convert it, `None` when unset
    fn env_with<T, E>(
        &self,
        name: &str,
        convert: impl FnOnce(&str) -> Result<T, E>,
    ) -> ConfigResult<Option<T>>
    where
        E: std::fmt::Display,
    {
        let var = format!("{}_{}", self.prefix, name);
        match std::env::var(&var) {
            Ok(value) => convert(value.trim()).map(Some).map_err(|e| ConfigError::Env {
                var,
                message: e.to_string(),
            }),
            Err(_) => Ok(None),
        }
    }

    fn parse_env<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.env_with(name, str::parse::<T>)
    }

    fn duration_env(&self, name: &str) -> ConfigResult<Option<Duration>> {
        self.env_with(name, humantime::parse_duration)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
