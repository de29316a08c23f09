//! Resilience patterns for Bulwark
//!
//! This crate provides four independent primitives that wrap fallible,
//! potentially slow operations: a retry executor with exponential backoff,
//! a circuit breaker, a token bucket rate limiter and a timeout guard.
//!
//! None of them knows about the others. Callers stack them in whatever order
//! suits the dependency, typically:
//!
//! ```ignore
//! limiter.acquire(wait, &cancel).await.map_err(ResilienceError::widen::<QuoteError>)?;
//! breaker
//!     .call(|| async { guard.run(retry.execute(|| fetch_quote())).await.map_err(ResilienceError::flatten) })
//!     .await
//!     .map_err(ResilienceError::flatten)
//! ```
//!
//! Every blocking wait accepts a [`CancellationToken`] and returns
//! [`ResilienceError::Cancelled`] promptly once it fires.

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
pub mod timeout;

// Re-export commonly used types
pub use backoff::BackoffCalculator;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerBuilder, CircuitMetrics, CircuitState};
pub use clock::{
    default_clock, sleep_or_cancel, sleep_or_cancel_blocking, Clock, ManualClock, MonotonicClock,
};
pub use error::{ResilienceError, Retryable};
pub use rate_limiter::RateLimiter;
pub use registry::{DependencyGuards, ResilienceRegistry};
pub use retry::{RetryExecutor, RetryPolicy, RetryPredicate, UseRetryable};
pub use timeout::TimeoutGuard;

pub use bulwark_config::{ConfigError, ConfigResult};
pub use tokio_util::sync::CancellationToken;
