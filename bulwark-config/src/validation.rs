//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};
use std::time::Duration;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate a non-zero duration
pub fn validate_positive_duration(value: Duration, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::Invalid {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0", field_name),
        });
    }
    Ok(())
}

/// Validate that a float lies in `[min, max]`. NaN never passes.
pub fn validate_range(value: f64, min: f64, max: f64, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            domain: domain.to_string(),
            message: format!(
                "{} must be between {} and {}, got {}",
                field_name, min, max, value
            ),
        });
    }
    Ok(())
}

/// Validate that a float is finite and strictly greater than `min`
pub fn validate_greater_than(value: f64, min: f64, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !value.is_finite() || value <= min {
        return Err(ConfigError::Invalid {
            domain: domain.to_string(),
            message: format!("{} must be greater than {}, got {}", field_name, min, value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u32, "threshold", "test").is_ok());
        assert!(validate_positive(0u32, "threshold", "test").is_err());
        assert!(validate_positive(-1.5f64, "rate", "test").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.0, 0.0, 1.0, "jitter", "test").is_ok());
        assert!(validate_range(1.0, 0.0, 1.0, "jitter", "test").is_ok());
        assert!(validate_range(1.01, 0.0, 1.0, "jitter", "test").is_err());
        assert!(validate_range(f64::NAN, 0.0, 1.0, "jitter", "test").is_err());
    }

    #[test]
    fn test_validate_greater_than() {
        assert!(validate_greater_than(1.5, 1.0, "multiplier", "test").is_ok());
        assert!(validate_greater_than(1.0, 1.0, "multiplier", "test").is_err());
        assert!(validate_greater_than(f64::INFINITY, 1.0, "multiplier", "test").is_err());
    }

    #[test]
    fn test_error_carries_domain() {
        let err = validate_positive_duration(Duration::ZERO, "timeout", "timeout").unwrap_err();
        assert_eq!(err.domain(), Some("timeout"));
        assert!(err.to_string().contains("timeout must be greater than 0"));
    }
}
