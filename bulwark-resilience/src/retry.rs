//! Retry policy and executor

use bulwark_config::{ConfigResult, RetryConfig, Validatable};
use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffCalculator;
use crate::clock::{sleep_or_cancel, sleep_or_cancel_blocking};
use crate::error::{ResilienceError, Retryable};

/// Validated, immutable retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, rejecting invalid values
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Exponential policy with default multiplier, jitter and cap
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> ConfigResult<Self> {
        Self::new(RetryConfig {
            max_attempts,
            base_delay,
            max_delay: base_delay.max(RetryConfig::default().max_delay),
            ..Default::default()
        })
    }

    /// Create a conservative retry policy for critical operations
    pub fn conservative() -> Self {
        Self {
            config: RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(60),
                backoff_multiplier: 1.5,
                jitter_fraction: 0.2,
                jitter_seed: None,
            },
        }
    }

    /// Create an aggressive retry policy for fast operations
    pub fn aggressive() -> Self {
        Self {
            config: RetryConfig {
                max_attempts: 10,
                base_delay: Duration::from_millis(50),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 1.2,
                jitter_fraction: 0.2,
                jitter_seed: None,
            },
        }
    }

    /// Same policy with a fixed jitter seed
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.config.jitter_seed = Some(seed);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.config.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.config.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.config.backoff_multiplier
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.config.jitter_fraction
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Fresh backoff calculator for this policy
    pub fn backoff(&self) -> BackoffCalculator {
        BackoffCalculator::from_config(&self.config)
    }
}

/// Decides whether a failed attempt should be retried
pub trait RetryPredicate<E>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;

    /// Delay requested by the error, overriding the computed backoff
    fn retry_delay(&self, _error: &E) -> Option<Duration> {
        None
    }
}

/// Classify errors through their [`Retryable`] implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct UseRetryable;

impl<E: Retryable> RetryPredicate<E> for UseRetryable {
    fn should_retry(&self, error: &E) -> bool {
        error.is_retryable()
    }

    fn retry_delay(&self, error: &E) -> Option<Duration> {
        error.retry_delay()
    }
}

impl<E, F> RetryPredicate<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        self(error)
    }
}

/// Retry executor
///
/// Attempts run strictly one after another. The executor owns its jitter
/// generator, so a seeded policy yields a reproducible delay sequence per
/// executor.
#[derive(Debug)]
pub struct RetryExecutor<P = UseRetryable> {
    policy: RetryPolicy,
    backoff: BackoffCalculator,
    predicate: P,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            backoff: policy.backoff(),
            policy,
            predicate: UseRetryable,
        }
    }

    /// Create with default policy
    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<P> RetryExecutor<P> {
    /// Replace the retry classification with a predicate
    pub fn retry_if<Q>(self, predicate: Q) -> RetryExecutor<Q> {
        RetryExecutor {
            policy: self.policy,
            backoff: self.backoff,
            predicate,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let never = CancellationToken::new();
        self.run(|_attempt| f(), &never).await
    }

    /// Execute with retry logic, stopping as soon as `cancel` fires
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        mut f: F,
        cancel: &CancellationToken,
    ) -> Result<T, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run(|_attempt| f(), cancel).await
    }

    /// Execute a function with retry logic and attempt context
    pub async fn execute_with_context<F, Fut, T, E>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let never = CancellationToken::new();
        self.run(f, &never).await
    }

    /// Full form: attempt number passed to the operation, cancellable
    pub async fn run<F, Fut, T, E>(
        &self,
        mut f: F,
        cancel: &CancellationToken,
    ) -> Result<T, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                debug!("Retry loop cancelled before attempt {}", attempt);
                return Err(ResilienceError::Cancelled);
            }

            debug!("Executing attempt {} of {}", attempt, max_attempts);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Retry loop cancelled during attempt {}", attempt);
                    return Err(ResilienceError::Cancelled);
                }
                outcome = f(attempt) => outcome,
            };

            let delay = match self.after_attempt(attempt, outcome, cancel)? {
                Ok(result) => return Ok(result),
                Err(delay) => delay,
            };

            if !sleep_or_cancel(delay, cancel).await {
                debug!("Retry loop cancelled while waiting {:?}", delay);
                return Err(ResilienceError::Cancelled);
            }

            attempt += 1;
        }
    }

    /// Retry a blocking operation on the calling thread.
    ///
    /// Attempts themselves cannot be interrupted; `cancel` is checked before
    /// each attempt, after a failed one and throughout every backoff wait.
    pub fn execute_blocking<F, T, E>(
        &self,
        mut f: F,
        cancel: &CancellationToken,
    ) -> Result<T, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                debug!("Retry loop cancelled before attempt {}", attempt);
                return Err(ResilienceError::Cancelled);
            }

            debug!("Executing blocking attempt {} of {}", attempt, max_attempts);

            let delay = match self.after_attempt(attempt, f(), cancel)? {
                Ok(result) => return Ok(result),
                Err(delay) => delay,
            };

            if !sleep_or_cancel_blocking(delay, cancel) {
                debug!("Retry loop cancelled while waiting {:?}", delay);
                return Err(ResilienceError::Cancelled);
            }

            attempt += 1;
        }
    }

    /// Classify one attempt's outcome.
    ///
    /// `Ok(Ok(value))` ends the loop with success, `Ok(Err(delay))` asks for
    /// another attempt after `delay`, and `Err` ends it with a failure.
    fn after_attempt<T, E>(
        &self,
        attempt: u32,
        outcome: Result<T, E>,
        cancel: &CancellationToken,
    ) -> Result<Result<T, Duration>, ResilienceError<E>>
    where
        P: RetryPredicate<E>,
        E: std::fmt::Display,
    {
        let error = match outcome {
            Ok(result) => {
                if attempt > 1 {
                    info!("Operation succeeded after {} attempts", attempt);
                }
                return Ok(Ok(result));
            }
            Err(error) => error,
        };

        if cancel.is_cancelled() {
            debug!("Retry loop cancelled; dropping error from attempt {}: {}", attempt, error);
            return Err(ResilienceError::Cancelled);
        }

        if !self.predicate.should_retry(&error) {
            warn!("Operation failed with non-retryable error: {}", error);
            return Err(ResilienceError::Operation(error));
        }

        let max_attempts = self.policy.max_attempts();
        if attempt >= max_attempts {
            warn!("Operation failed after {} attempts: {}", attempt, error);
            return Err(ResilienceError::RetriesExhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let delay = self
            .predicate
            .retry_delay(&error)
            .unwrap_or_else(|| self.backoff.calculate_delay(attempt));

        warn!(
            "Attempt {} failed: {}. Retrying in {:?}",
            attempt, error, delay
        );

        Ok(Err(delay))
    }
}
