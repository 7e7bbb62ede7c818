//! # Circuit Breaker Metrics
//!
//! Point-in-time snapshot of a breaker's counters, suitable for health
//! endpoints and logging.

use super::CircuitState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the wrapped operation
    pub total_calls: u64,
    pub success_count: u64,
    /// Failed calls, timeouts included
    pub failure_count: u64,
    pub timeout_count: u64,
    /// Calls rejected without invoking the operation
    pub rejected_count: u64,
    /// Outcomes currently held in the rolling window
    pub window_calls: u64,
    /// Failure rate over the rolling window, 0.0..=1.0
    pub window_failure_rate: f64,
    pub current_state: CircuitState,
    /// Milliseconds since the last state transition
    pub millis_in_state: u64,
}

impl CircuitBreakerMetrics {
    /// Overall failure rate since process start, 0.0..=1.0
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.total_calls as f64
        }
    }
}
