//! Time sources and cancellable sleeping

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Monotonic time source used by the circuit breaker and rate limiter.
///
/// Production code uses [`MonotonicClock`]; tests substitute a
/// [`ManualClock`] to drive state transitions without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's monotonic instant.
///
/// Follows tokio's paused time in tests that enable it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Start at the current instant
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Shared handle to the default clock
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(MonotonicClock)
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` when the full duration elapsed and `false` when cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Longest a blocking wait goes without looking at its cancellation token
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Blocking counterpart of [`sleep_or_cancel`] for callers outside a runtime.
///
/// The token is checked at least every 10ms, so cancellation is observed
/// within that interval.
pub fn sleep_or_cancel_blocking(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = std::time::Instant::now().checked_add(duration);

    loop {
        if cancel.is_cancelled() {
            return false;
        }

        let remaining = deadline
            .map(|deadline| deadline.saturating_duration_since(std::time::Instant::now()))
            .unwrap_or(Duration::MAX);
        if remaining.is_zero() {
            return true;
        }

        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}
