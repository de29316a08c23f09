//! Wall-clock limits for guarded operations
//!
//! A timeout is reported to the caller as soon as the limit passes. Whether
//! the operation actually stops depends on how it is run:
//!
//! - [`TimeoutGuard::run`] drops the future, so async work stops at its next
//!   await point.
//! - [`TimeoutGuard::run_cancellable`] runs the operation as a task and
//!   cancels the token it was given; the operation decides when to stop.
//! - [`TimeoutGuard::run_blocking`] abandons the blocking thread, which keeps
//!   running to completion in the background.

use bulwark_config::{ConfigResult, TimeoutConfig, Validatable};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;

/// Bounds how long a single call may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGuard {
    duration: Duration,
}

impl TimeoutGuard {
    /// Create a guard; a zero duration is rejected
    pub fn new(duration: Duration) -> ConfigResult<Self> {
        Self::from_config(&TimeoutConfig { duration })
    }

    pub fn from_config(config: &TimeoutConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            duration: config.duration,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Race `operation` against the limit
    pub async fn run<Fut, T, E>(&self, operation: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match timeout(self.duration, operation).await {
            Ok(result) => result.map_err(ResilienceError::Operation),
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Run `f` as its own task, cancelling the token handed to it when the
    /// limit passes. The task is left to wind down on its own.
    pub async fn run_cancellable<F, Fut, T, E>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let token = CancellationToken::new();
        let mut handle = tokio::spawn(f(token.clone()));

        match timeout(self.duration, &mut handle).await {
            Ok(joined) => Self::unwrap_join(joined),
            Err(_) => {
                token.cancel();
                Err(self.timed_out())
            }
        }
    }

    /// Run a blocking `f` on the blocking pool. On timeout the thread is
    /// abandoned, not interrupted.
    pub async fn run_blocking<F, T, E>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(f);

        match timeout(self.duration, handle).await {
            Ok(joined) => Self::unwrap_join(joined),
            Err(_) => {
                log::debug!("Abandoning blocking operation still running after {:?}", self.duration);
                Err(self.timed_out())
            }
        }
    }

    fn unwrap_join<T, E>(
        joined: Result<Result<T, E>, tokio::task::JoinError>,
    ) -> Result<T, ResilienceError<E>> {
        match joined {
            Ok(result) => result.map_err(ResilienceError::Operation),
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(_) => Err(ResilienceError::Cancelled),
        }
    }

    fn timed_out<E>(&self) -> ResilienceError<E> {
        log::warn!("Operation timed out after {:?}", self.duration);
        ResilienceError::Timeout {
            limit: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out_at_limit() {
        let guard = TimeoutGuard::new(Duration::from_millis(500)).unwrap();

        let start = Instant::now();
        let result: Result<(), ResilienceError<&str>> = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_passes_through() {
        let guard = TimeoutGuard::new(Duration::from_secs(1)).unwrap();

        let ok: Result<u32, ResilienceError<&str>> = guard.run(async { Ok(42) }).await;
        assert_eq!(ok.unwrap(), 42);

        let err: Result<u32, ResilienceError<&str>> = guard.run(async { Err("403") }).await;
        assert!(matches!(err, Err(ResilienceError::Operation("403"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_operation_sees_cancel() {
        let guard = TimeoutGuard::new(Duration::from_secs(1)).unwrap();
        let observed = Arc::new(AtomicBool::new(false));

        let flag = observed.clone();
        let result: Result<(), ResilienceError<String>> = guard
            .run_cancellable(move |cancel| async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        flag.store(true, Ordering::SeqCst);
                        Err("stopped".to_string())
                    }
                    _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
                }
            })
            .await;
        assert!(result.unwrap_err().is_timeout());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blocking_operation_abandoned() {
        let guard = TimeoutGuard::new(Duration::from_millis(50)).unwrap();

        let start = std::time::Instant::now();
        let result: Result<(), ResilienceError<String>> = guard
            .run_blocking(|| {
                std::thread::sleep(Duration::from_secs(2));
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_blocking_operation_result() {
        let guard = TimeoutGuard::new(Duration::from_secs(5)).unwrap();
        let value: Result<u8, ResilienceError<String>> = guard.run_blocking(|| Ok(9)).await;
        assert_eq!(value.unwrap(), 9);
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(TimeoutGuard::new(Duration::ZERO).is_err());
        assert_eq!(
            TimeoutGuard::from_config(&TimeoutConfig::default())
                .unwrap()
                .duration(),
            Duration::from_secs(30)
        );
    }
}
