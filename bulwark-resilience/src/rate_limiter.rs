//! Token bucket rate limiter
//!
//! Tokens accumulate at `refill_rate` per second up to `capacity` and each
//! admitted call consumes one. Refill is computed lazily on access, so no
//! background task is involved.

use bulwark_config::{ConfigResult, RateLimiterConfig, Validatable};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{default_clock, sleep_or_cancel, sleep_or_cancel_blocking, Clock};
use crate::error::ResilienceError;

/// Shortest sleep between re-checks while waiting for a token
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Thread-safe token bucket shared by every caller of one dependency.
///
/// Clones share the same bucket. The refill and the deduction happen under
/// one lock so concurrent callers can never be over-admitted.
#[derive(Clone)]
pub struct RateLimiter {
    name: Arc<str>,
    capacity: f64,
    refill_rate: f64,
    clock: Arc<dyn Clock>,
    bucket: Arc<Mutex<Bucket>>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, default_clock())
    }

    /// Create a limiter whose refill is measured by `clock`
    pub fn with_clock(
        name: impl Into<String>,
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let capacity = f64::from(config.capacity);
        let now = clock.now();
        Ok(Self {
            name: Arc::from(name.into()),
            capacity,
            refill_rate: config.refill_rate,
            clock,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                last_refill: now,
            })),
        })
    }

    /// Limiter admitting at most `max_calls` per `period` on average
    pub fn per_period(
        name: impl Into<String>,
        max_calls: u32,
        period: Duration,
    ) -> ConfigResult<Self> {
        Self::new(name, RateLimiterConfig::per_period(max_calls, period))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens currently in the bucket, after refilling
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, self.clock.now());
        bucket.tokens
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        match self.try_take() {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Rate limiter '{}' has no tokens available", self.name);
                false
            }
        }
    }

    /// Wait up to `timeout` for a token.
    ///
    /// A zero timeout makes a single attempt. Fails with
    /// [`ResilienceError::RateLimitTimeout`] when the deadline passes and with
    /// [`ResilienceError::Cancelled`] as soon as `cancel` fires. Waiters are
    /// not served in arrival order.
    pub async fn acquire(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ResilienceError> {
        let deadline = self.clock.now().checked_add(timeout);

        loop {
            if cancel.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }

            let wait = match self.next_wait(deadline, timeout)? {
                Some(wait) => wait,
                None => return Ok(()),
            };

            if !sleep_or_cancel(wait, cancel).await {
                return Err(ResilienceError::Cancelled);
            }
        }
    }

    /// Blocking form of [`acquire`](Self::acquire) for callers outside a runtime
    pub fn wait_blocking(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ResilienceError> {
        let deadline = self.clock.now().checked_add(timeout);

        loop {
            if cancel.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }

            let wait = match self.next_wait(deadline, timeout)? {
                Some(wait) => wait,
                None => return Ok(()),
            };

            if !sleep_or_cancel_blocking(wait, cancel) {
                return Err(ResilienceError::Cancelled);
            }
        }
    }

    /// Wait up to `timeout` for a token, returning whether one was taken
    pub async fn wait_if_needed(&self, timeout: Duration) -> bool {
        self.acquire(timeout, &CancellationToken::new()).await.is_ok()
    }

    /// Acquire a token, waiting up to `timeout`, then run `f`
    pub async fn call<F, Fut, T, E>(&self, timeout: Duration, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(error) = self.acquire(timeout, &CancellationToken::new()).await {
            return Err(error.widen());
        }

        f().await.map_err(ResilienceError::Operation)
    }

    /// Take a token (`None`) or say how long to sleep before trying again
    fn next_wait(
        &self,
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> Result<Option<Duration>, ResilienceError> {
        let wait = match self.try_take() {
            Ok(()) => return Ok(None),
            Err(wait) => wait,
        };

        let remaining = deadline
            .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
            .unwrap_or(Duration::MAX);
        if remaining.is_zero() {
            log::warn!(
                "Rate limiter '{}' gave up after waiting {:?} for a token",
                self.name,
                timeout
            );
            return Err(ResilienceError::RateLimitTimeout {
                name: self.name.to_string(),
                waited: timeout,
            });
        }

        log::trace!("Rate limiter '{}' waiting {:?}", self.name, wait.min(remaining));
        Ok(Some(wait.min(remaining)))
    }

    /// Refill and deduct one token, or report how long until one exists
    fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, self.clock.now());

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let seconds = (1.0 - bucket.tokens) / self.refill_rate;
            let wait = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
            Err(wait.max(MIN_WAIT))
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish_non_exhaustive()
    }
}
