//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for calls to a remote peer. This implementation
//! follows the classic circuit breaker pattern with three states: Closed
//! (normal operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! The failure rate is evaluated over a count-based rolling window of the most
//! recent outcomes. Every call runs under a per-call timeout; a call that
//! exceeds it is dropped and recorded as a failure.
//!
//! State transitions and failures are logged and broadcast as
//! [`CircuitEvent`]s. Subscribers observe; they cannot influence the breaker.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a bounded number of probe calls are allowed through
    HalfOpen,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not invoked
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation did not complete within the per-call timeout
    #[error("Operation timed out after {timeout_ms}ms for {component}")]
    Timeout { component: String, timeout_ms: u64 },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the failure was produced without contacting the operation
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

/// Observability notifications emitted by a circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitEvent {
    Opened { component: String, failure_rate: f64 },
    HalfOpened { component: String },
    Closed { component: String },
    Failure { component: String, error: String },
    Rejected { component: String },
}

/// How a call was admitted; decides how its outcome is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    last_transition: Instant,
    /// Most recent outcomes, `true` marks a failure
    window: VecDeque<bool>,
    half_open_in_flight: u32,
    half_open_successes: u32,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    timeout_count: u64,
    rejected_count: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            last_transition: Instant::now(),
            window: VecDeque::new(),
            half_open_in_flight: 0,
            half_open_successes: 0,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            timeout_count: 0,
            rejected_count: 0,
        }
    }

    fn window_failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        failures as f64 / self.window.len() as f64
    }

    fn push_outcome(&mut self, failed: bool, window_size: u32) {
        self.window.push_back(failed);
        while self.window.len() > window_size as usize {
            self.window.pop_front();
        }
    }

    fn enter(&mut self, state: CircuitState) {
        self.state = state;
        self.last_transition = Instant::now();
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        if state == CircuitState::Closed {
            self.window.clear();
        }
    }
}

/// Circuit breaker guarding one protected operation
///
/// Create one per protected operation at startup and share it (e.g. behind an
/// `Arc`) for the process lifetime.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State and counters; never held across an await point
    inner: Mutex<BreakerState>,

    events: broadcast::Sender<CircuitEvent>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold_percent = config.failure_threshold_percent,
            call_timeout_ms = config.call_timeout.as_millis() as u64,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            rolling_window_size = config.rolling_window_size,
            "Circuit breaker initialized"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
            events,
        }
    }

    /// Get current circuit state
    ///
    /// An open circuit whose reset timeout has elapsed still reports `Open`
    /// until the next call moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Subscribe to state transition and failure notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitEvent> {
        self.events.subscribe()
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let admission = match self.admit() {
            Some(admission) => admission,
            None => {
                return Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                })
            }
        };

        let mut guard = ProbeGuard::new(self, admission);
        let start_time = Instant::now();
        let outcome = tokio::time::timeout(self.config.call_timeout, operation()).await;
        let duration = start_time.elapsed();
        guard.disarm();

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(admission, duration);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure(admission, duration, err.to_string(), false);
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(_elapsed) => {
                let timeout_ms = self.config.call_timeout.as_millis() as u64;
                self.record_failure(
                    admission,
                    duration,
                    format!("timed out after {timeout_ms}ms"),
                    true,
                );
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    timeout_ms,
                })
            }
        }
    }

    /// Decide whether a call may invoke the operation
    fn admit(&self) -> Option<Admission> {
        let mut events = Vec::new();
        let admission = {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open
                && inner.last_transition.elapsed() >= self.config.reset_timeout
            {
                inner.enter(CircuitState::HalfOpen);
                events.push(CircuitEvent::HalfOpened {
                    component: self.name.clone(),
                });
            }

            match inner.state {
                CircuitState::Closed => Some(Admission::Normal),
                CircuitState::HalfOpen if inner.half_open_in_flight < self.config.half_open_max_calls => {
                    inner.half_open_in_flight += 1;
                    Some(Admission::Probe)
                }
                CircuitState::HalfOpen | CircuitState::Open => {
                    inner.rejected_count += 1;
                    events.push(CircuitEvent::Rejected {
                        component: self.name.clone(),
                    });
                    None
                }
            }
        };
        self.emit(events);
        admission
    }

    /// Record a successful operation
    fn record_success(&self, admission: Admission, duration: Duration) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.total_calls += 1;
            inner.success_count += 1;

            debug!(
                component = %self.name,
                duration_ms = duration.as_millis() as u64,
                "Operation succeeded"
            );

            match (inner.state, admission) {
                (CircuitState::Closed, Admission::Normal) => {
                    inner.push_outcome(false, self.config.rolling_window_size);
                }
                (CircuitState::HalfOpen, Admission::Probe) => {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_max_calls {
                        inner.enter(CircuitState::Closed);
                        events.push(CircuitEvent::Closed {
                            component: self.name.clone(),
                        });
                    }
                }
                // Outcome of a call admitted under a state that has since changed
                _ => {}
            }
        }
        self.emit(events);
    }

    /// Record a failed or timed-out operation
    fn record_failure(&self, admission: Admission, duration: Duration, error: String, timed_out: bool) {
        let mut events = vec![CircuitEvent::Failure {
            component: self.name.clone(),
            error: error.clone(),
        }];
        {
            let mut inner = self.inner.lock();
            inner.total_calls += 1;
            inner.failure_count += 1;
            if timed_out {
                inner.timeout_count += 1;
            }

            warn!(
                component = %self.name,
                duration_ms = duration.as_millis() as u64,
                error = %error,
                "Operation failed"
            );

            match (inner.state, admission) {
                (CircuitState::Closed, Admission::Normal) => {
                    inner.push_outcome(true, self.config.rolling_window_size);
                    let failure_rate = inner.window_failure_rate();
                    let threshold = f64::from(self.config.failure_threshold_percent) / 100.0;
                    if inner.window.len() >= self.config.minimum_calls as usize
                        && failure_rate > threshold
                    {
                        inner.enter(CircuitState::Open);
                        events.push(CircuitEvent::Opened {
                            component: self.name.clone(),
                            failure_rate,
                        });
                    }
                }
                (CircuitState::HalfOpen, Admission::Probe) => {
                    // Any probe failure reopens and restarts the reset timeout
                    inner.enter(CircuitState::Open);
                    events.push(CircuitEvent::Opened {
                        component: self.name.clone(),
                        failure_rate: 1.0,
                    });
                }
                _ => {}
            }
        }
        self.emit(events);
    }

    /// Release a probe slot whose call was cancelled before completing
    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn emit(&self, events: Vec<CircuitEvent>) {
        for event in events {
            match &event {
                CircuitEvent::Opened { failure_rate, .. } => error!(
                    component = %self.name,
                    failure_rate = *failure_rate,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "Circuit breaker opened (failing fast)"
                ),
                CircuitEvent::HalfOpened { .. } => info!(
                    component = %self.name,
                    "Circuit breaker half-open (testing recovery)"
                ),
                CircuitEvent::Closed { .. } => info!(
                    component = %self.name,
                    "Circuit breaker closed (recovered)"
                ),
                CircuitEvent::Rejected { .. } => debug!(
                    component = %self.name,
                    "Call rejected by open circuit"
                ),
                CircuitEvent::Failure { .. } => {}
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let failure_rate = {
            let mut inner = self.inner.lock();
            inner.enter(CircuitState::Open);
            inner.window_failure_rate()
        };
        self.emit(vec![CircuitEvent::Opened {
            component: self.name.clone(),
            failure_rate,
        }]);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.inner.lock().enter(CircuitState::Closed);
        self.emit(vec![CircuitEvent::Closed {
            component: self.name.clone(),
        }]);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            timeout_count: inner.timeout_count,
            rejected_count: inner.rejected_count,
            window_calls: inner.window.len() as u64,
            window_failure_rate: inner.window_failure_rate(),
            current_state: inner.state,
            millis_in_state: inner.last_transition.elapsed().as_millis() as u64,
        }
    }
}

/// Frees a half-open probe slot if the caller drops the call future mid-flight
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            armed: admission == Admission::Probe,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}
