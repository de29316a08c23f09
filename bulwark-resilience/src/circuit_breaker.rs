//! Circuit breaker pattern implementation

use bulwark_config::{CircuitBreakerConfig, ConfigResult, Validatable};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::{default_clock, Clock};
use crate::error::ResilienceError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, limited requests allowed to test recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Snapshot of circuit breaker counters
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    /// Calls admitted or recorded manually
    pub total_requests: u64,
    /// Number of successful requests
    pub total_successes: u64,
    /// Number of failed requests
    pub total_failures: u64,
    /// Errors the failure predicate excluded
    pub total_ignored: u64,
    /// Number of requests rejected due to open circuit
    pub total_rejected: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Successful trial calls in the current half-open period
    pub half_open_successes: u32,
    /// Trial calls currently running
    pub half_open_in_flight: u32,
    /// Last failure time
    pub last_failure_time: Option<Instant>,
    /// Last success time
    pub last_success_time: Option<Instant>,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// Thread-safe circuit breaker for one named dependency.
///
/// Clones share state. The admission decision and every state transition
/// happen under a single lock, which is never held while the wrapped
/// operation runs.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    /// Bumped on every transition; outcomes of calls admitted under an
    /// older generation only update totals
    generation: u64,
    metrics: CircuitMetrics,
}

/// Admission ticket for one call
#[derive(Debug, Clone, Copy)]
struct Permit {
    generation: u64,
    trial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, default_clock())
    }

    /// Create a circuit breaker reading time from `clock`
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: Arc::from(name.into()),
            config: Arc::new(config),
            clock,
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                generation: 0,
                metrics: CircuitMetrics::default(),
            })),
        })
    }

    /// Start building a circuit breaker
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `f` through the breaker. Every error counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_filtered(f, |_| true).await
    }

    /// Run `f` through the breaker, counting only errors for which
    /// `is_failure` returns true. Other errors are returned unchanged and
    /// leave the breaker's counters alone.
    pub async fn call_filtered<F, Fut, T, E, P>(
        &self,
        f: F,
        is_failure: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let guard = self.admit::<E>()?;

        match f().await {
            Ok(value) => {
                guard.complete(Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                let outcome = if is_failure(&error) {
                    Outcome::Failure
                } else {
                    Outcome::Ignored
                };
                guard.complete(outcome);
                Err(ResilienceError::Operation(error))
            }
        }
    }

    /// Run a blocking `f` through the breaker on the current thread
    pub fn call_blocking<F, T, E>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.admit::<E>()?;

        match f() {
            Ok(value) => {
                guard.complete(Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                guard.complete(Outcome::Failure);
                Err(ResilienceError::Operation(error))
            }
        }
    }

    /// Check if the circuit breaker is open (requests should be blocked)
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.update_state(&mut state, self.clock.now());
        state.state
    }

    /// Record a successful operation performed outside [`call`](Self::call)
    pub fn record_success(&self) {
        self.record_manual(Outcome::Success);
    }

    /// Record a failed operation performed outside [`call`](Self::call)
    pub fn record_failure(&self) {
        self.record_manual(Outcome::Failure);
    }

    /// Get current metrics
    pub fn metrics(&self) -> CircuitMetrics {
        let state = self.state.lock();
        state.metrics.clone()
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.generation += 1;
        state.metrics = CircuitMetrics {
            last_state_change: Some(self.clock.now()),
            ..Default::default()
        };
        log::info!("Circuit breaker '{}' reset", self.name);
    }

    // Internal methods

    fn admit<E>(&self) -> Result<PermitGuard<'_>, ResilienceError<E>> {
        match self.try_acquire_permit() {
            Some(permit) => Ok(PermitGuard {
                breaker: self,
                permit: Some(permit),
            }),
            None => Err(ResilienceError::CircuitOpen {
                name: self.name.to_string(),
            }),
        }
    }

    fn try_acquire_permit(&self) -> Option<Permit> {
        let mut state = self.state.lock();
        self.update_state(&mut state, self.clock.now());

        match state.state {
            CircuitState::Closed => {
                state.metrics.total_requests += 1;
                Some(Permit {
                    generation: state.generation,
                    trial: false,
                })
            }
            CircuitState::HalfOpen => {
                let admitted =
                    state.metrics.half_open_in_flight + state.metrics.half_open_successes;
                if admitted < self.config.half_open_success_threshold {
                    state.metrics.total_requests += 1;
                    state.metrics.half_open_in_flight += 1;
                    Some(Permit {
                        generation: state.generation,
                        trial: true,
                    })
                } else {
                    state.metrics.total_rejected += 1;
                    log::debug!(
                        "Circuit breaker '{}' rejected call: all trial slots taken",
                        self.name
                    );
                    None
                }
            }
            CircuitState::Open => {
                state.metrics.total_rejected += 1;
                log::debug!("Circuit breaker '{}' rejected call: circuit open", self.name);
                None
            }
        }
    }

    fn record_manual(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.update_state(&mut state, now);

        state.metrics.total_requests += 1;
        let permit = Permit {
            generation: state.generation,
            trial: false,
        };
        self.apply_outcome(&mut state, permit, outcome, now);
    }

    fn complete(&self, permit: Permit, outcome: Outcome) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.apply_outcome(&mut state, permit, outcome, now);
    }

    fn apply_outcome(
        &self,
        state: &mut CircuitBreakerState,
        permit: Permit,
        outcome: Outcome,
        now: Instant,
    ) {
        let current = permit.generation == state.generation;

        if permit.trial && current {
            state.metrics.half_open_in_flight = state.metrics.half_open_in_flight.saturating_sub(1);
        }

        match outcome {
            Outcome::Success => {
                state.metrics.total_successes += 1;
                state.metrics.last_success_time = Some(now);
            }
            Outcome::Failure => {
                state.metrics.total_failures += 1;
                state.metrics.last_failure_time = Some(now);
            }
            Outcome::Ignored => {
                state.metrics.total_ignored += 1;
            }
        }

        if !current {
            log::debug!(
                "Circuit breaker '{}' ignoring outcome of a call admitted before the last transition",
                self.name
            );
            return;
        }

        match (state.state, outcome) {
            (CircuitState::Closed, Outcome::Success) => {
                state.metrics.consecutive_failures = 0;
            }
            (CircuitState::Closed, Outcome::Failure) => {
                state.metrics.consecutive_failures += 1;
                if state.metrics.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(state, now);
                }
            }
            (CircuitState::HalfOpen, Outcome::Success) => {
                state.metrics.half_open_successes += 1;
                if state.metrics.half_open_successes >= self.config.half_open_success_threshold {
                    self.transition_to_closed(state, now);
                }
            }
            (CircuitState::HalfOpen, Outcome::Failure) => {
                state.metrics.consecutive_failures += 1;
                self.transition_to_open(state, now);
            }
            (CircuitState::Open, _) | (_, Outcome::Ignored) => {}
        }
    }

    fn update_state(&self, state: &mut CircuitBreakerState, now: Instant) {
        if state.state == CircuitState::Open {
            let elapsed = state
                .metrics
                .last_failure_time
                .map(|last_failure| now.saturating_duration_since(last_failure))
                .unwrap_or(Duration::MAX);

            if elapsed >= self.config.reset_timeout {
                self.transition_to_half_open(state, now);
            }
        }
    }

    fn transition_to_open(&self, state: &mut CircuitBreakerState, now: Instant) {
        state.state = CircuitState::Open;
        state.generation += 1;
        state.metrics.half_open_successes = 0;
        state.metrics.half_open_in_flight = 0;
        state.metrics.last_failure_time = Some(now);
        state.metrics.last_state_change = Some(now);
        log::warn!(
            "Circuit breaker '{}' opened after {} consecutive failures",
            self.name,
            state.metrics.consecutive_failures
        );
    }

    fn transition_to_closed(&self, state: &mut CircuitBreakerState, now: Instant) {
        state.state = CircuitState::Closed;
        state.generation += 1;
        state.metrics.consecutive_failures = 0;
        state.metrics.half_open_successes = 0;
        state.metrics.half_open_in_flight = 0;
        state.metrics.last_state_change = Some(now);
        log::info!("Circuit breaker '{}' closed after successful recovery", self.name);
    }

    fn transition_to_half_open(&self, state: &mut CircuitBreakerState, now: Instant) {
        state.state = CircuitState::HalfOpen;
        state.generation += 1;
        state.metrics.half_open_successes = 0;
        state.metrics.half_open_in_flight = 0;
        state.metrics.last_state_change = Some(now);
        log::info!("Circuit breaker '{}' transitioned to half-open state", self.name);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Releases a trial slot when a guarded call is dropped before finishing,
/// e.g. by an enclosing timeout. Such calls count as neither success nor
/// failure.
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<Permit>,
}

impl PermitGuard<'_> {
    fn complete(mut self, outcome: Outcome) {
        if let Some(permit) = self.permit.take() {
            self.breaker.complete(permit, outcome);
        }
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.complete(permit, Outcome::Ignored);
        }
    }
}

/// Builder for circuit breakers
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
            clock: None,
        }
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set success threshold for recovery
    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_success_threshold = threshold;
        self
    }

    /// Set timeout before attempting recovery
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Use a specific clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> ConfigResult<CircuitBreaker> {
        let clock = self.clock.unwrap_or_else(default_clock);
        CircuitBreaker::with_clock(self.name, self.config, clock)
    }
}
