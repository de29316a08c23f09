//! Domain-driven configuration for Bulwark
//!
//! Each resilience primitive has its own configuration domain with defaults,
//! validation and environment variable overrides. Named dependencies share a
//! set of defaults and override individual sections.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    circuit_breaker::CircuitBreakerConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    rate_limiter::RateLimiterConfig,
    retry::RetryConfig,
    timeout::TimeoutConfig,
    BulwarkConfig, DependencyConfig,
};
