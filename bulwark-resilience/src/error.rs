//! Error taxonomy shared by the resilience components

use std::convert::Infallible;
use std::time::Duration;

/// Trait for errors that can classify themselves for retrying
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Delay requested by the error itself, e.g. a server's Retry-After.
    /// Overrides the computed backoff for that retry.
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::*;
        matches!(
            self.kind(),
            TimedOut
                | Interrupted
                | WouldBlock
                | ConnectionReset
                | ConnectionAborted
                | ConnectionRefused
                | BrokenPipe
                | UnexpectedEof
        )
    }
}

/// Outcome of a guarded call that did not produce a value.
///
/// `E` is the wrapped operation's own error type. Errors raised by a
/// component itself (open circuit, timeout, ...) carry no `E`, so waits that
/// never run an operation return `ResilienceError<Infallible>`.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E = Infallible> {
    /// The wrapped operation failed and was not retried
    #[error("{0}")]
    Operation(E),

    /// Every attempt failed with a retryable error
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: E },

    /// The circuit breaker rejected the call without running it
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// No rate limiter token became available in time
    #[error("Rate limiter '{name}' had no capacity within {waited:?}")]
    RateLimitTimeout { name: String, waited: Duration },

    /// The operation overran its time limit
    #[error("Operation timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// A wait or retry loop was cancelled externally
    #[error("Operation cancelled")]
    Cancelled,
}

impl<E> ResilienceError<E> {
    /// Get the underlying operation error if present
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::Operation(error) => Some(error),
            ResilienceError::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    /// Borrow the underlying operation error if present
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(error) => Some(error),
            ResilienceError::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ResilienceError::RateLimitTimeout { .. })
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }

    /// Transform the operation error, keeping the kind
    pub fn map_operation<F>(self, f: impl FnOnce(E) -> F) -> ResilienceError<F> {
        match self {
            ResilienceError::Operation(error) => ResilienceError::Operation(f(error)),
            ResilienceError::RetriesExhausted {
                attempts,
                last_error,
            } => ResilienceError::RetriesExhausted {
                attempts,
                last_error: f(last_error),
            },
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::RateLimitTimeout { name, waited } => {
                ResilienceError::RateLimitTimeout { name, waited }
            }
            ResilienceError::Timeout { limit } => ResilienceError::Timeout { limit },
            ResilienceError::Cancelled => ResilienceError::Cancelled,
        }
    }
}

impl ResilienceError<Infallible> {
    /// Use a component-only error where an operation error type is expected
    pub fn widen<E>(self) -> ResilienceError<E> {
        self.map_operation(|never| match never {})
    }
}

impl<E> ResilienceError<ResilienceError<E>> {
    /// Collapse the errors of two stacked components into one.
    ///
    /// An inner error surfaces with its own kind. When an outer retry loop
    /// exhausted its attempts on an inner operation failure, the result stays
    /// `RetriesExhausted`; if the last inner failure was a component error
    /// (say an open circuit), that component error is returned instead.
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            ResilienceError::Operation(inner) => inner,
            ResilienceError::RetriesExhausted {
                attempts,
                last_error: ResilienceError::Operation(error),
            } => ResilienceError::RetriesExhausted {
                attempts,
                last_error: error,
            },
            ResilienceError::RetriesExhausted { last_error, .. } => last_error,
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::RateLimitTimeout { name, waited } => {
                ResilienceError::RateLimitTimeout { name, waited }
            }
            ResilienceError::Timeout { limit } => ResilienceError::Timeout { limit },
            ResilienceError::Cancelled => ResilienceError::Cancelled,
        }
    }
}

/// Component rejections are transient from the caller's point of view, so an
/// outer retry loop may retry them. Cancellation and exhausted inner retries
/// are final.
impl<E: Retryable> Retryable for ResilienceError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            ResilienceError::Operation(error) => error.is_retryable(),
            ResilienceError::RetriesExhausted { .. } => false,
            ResilienceError::CircuitOpen { .. }
            | ResilienceError::RateLimitTimeout { .. }
            | ResilienceError::Timeout { .. } => true,
            ResilienceError::Cancelled => false,
        }
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self {
            ResilienceError::Operation(error) => error.retry_delay(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Upstream(&'static str);

    impl std::fmt::Display for Upstream {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "upstream: {}", self.0)
        }
    }

    impl Retryable for Upstream {
        fn is_retryable(&self) -> bool {
            self.0 != "bad request"
        }
    }

    #[test]
    fn test_display_messages() {
        let err: ResilienceError<Upstream> = ResilienceError::RetriesExhausted {
            attempts: 3,
            last_error: Upstream("503"),
        };
        assert_eq!(
            err.to_string(),
            "Maximum retry attempts (3) exceeded. Last error: upstream: 503"
        );

        let err: ResilienceError<Upstream> = ResilienceError::CircuitOpen {
            name: "alpaca".into(),
        };
        assert_eq!(err.to_string(), "Circuit breaker 'alpaca' is open");
    }

    #[test]
    fn test_flatten_keeps_inner_kind() {
        let nested: ResilienceError<ResilienceError<Upstream>> =
            ResilienceError::Operation(ResilienceError::Timeout {
                limit: Duration::from_secs(1),
            });
        assert!(nested.flatten().is_timeout());

        let nested: ResilienceError<ResilienceError<Upstream>> =
            ResilienceError::Operation(ResilienceError::Operation(Upstream("boom")));
        assert_eq!(
            nested.flatten().into_operation_error(),
            Some(Upstream("boom"))
        );
    }

    #[test]
    fn test_flatten_exhausted_retries() {
        let nested: ResilienceError<ResilienceError<Upstream>> = ResilienceError::RetriesExhausted {
            attempts: 4,
            last_error: ResilienceError::Operation(Upstream("503")),
        };
        match nested.flatten() {
            ResilienceError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, Upstream("503"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let nested: ResilienceError<ResilienceError<Upstream>> = ResilienceError::RetriesExhausted {
            attempts: 4,
            last_error: ResilienceError::CircuitOpen {
                name: "vault".into(),
            },
        };
        assert!(nested.flatten().is_circuit_open());
    }

    #[test]
    fn test_widen() {
        let err: ResilienceError = ResilienceError::Cancelled;
        let widened: ResilienceError<Upstream> = err.widen();
        assert!(widened.is_cancelled());
    }

    #[test]
    fn test_component_errors_are_retryable_except_cancel() {
        let open: ResilienceError<Upstream> = ResilienceError::CircuitOpen { name: "s3".into() };
        assert!(open.is_retryable());

        let cancelled: ResilienceError<Upstream> = ResilienceError::Cancelled;
        assert!(!cancelled.is_retryable());

        let bad: ResilienceError<Upstream> = ResilienceError::Operation(Upstream("bad request"));
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_io_error_classification() {
        use std::io::{Error, ErrorKind};
        assert!(Error::from(ErrorKind::ConnectionReset).is_retryable());
        assert!(Error::from(ErrorKind::TimedOut).is_retryable());
        assert!(!Error::from(ErrorKind::PermissionDenied).is_retryable());
        assert!(!Error::from(ErrorKind::NotFound).is_retryable());
    }
}
