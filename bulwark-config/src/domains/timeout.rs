//! Timeout guard configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wall-clock limit for one guarded call
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

impl Validatable for TimeoutConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive_duration(self.duration, "duration", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "timeout"
    }
}
