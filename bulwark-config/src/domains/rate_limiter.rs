//! Rate limiter configuration

use crate::error::ConfigResult;
use crate::validation::{validate_greater_than, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum burst size in tokens
    pub capacity: u32,

    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 10.0,
        }
    }
}

impl RateLimiterConfig {
    /// Express "at most `max_calls` per `period`" as a token bucket.
    ///
    /// A zero period produces an infinite refill rate, which fails validation.
    pub fn per_period(max_calls: u32, period: Duration) -> Self {
        Self {
            capacity: max_calls,
            refill_rate: max_calls as f64 / period.as_secs_f64(),
        }
    }
}

impl Validatable for RateLimiterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.capacity, "capacity", self.domain_name())?;
        validate_greater_than(self.refill_rate, 0.0, "refill_rate", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "rate_limiter"
    }
}
