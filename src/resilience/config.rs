//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker. File/environment
//! configuration lives in [`crate::config::CircuitBreakerSettings`] and is
//! converted into this struct at startup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Per-call timeout; an operation exceeding it is cancelled and counted as a failure
    pub call_timeout: Duration,

    /// Failure percentage over the rolling window above which the circuit opens
    pub failure_threshold_percent: u8,

    /// Time to wait in open state before admitting a half-open probe
    pub reset_timeout: Duration,

    /// Number of most recent call outcomes considered for the failure rate
    pub rolling_window_size: u32,

    /// Outcomes required in the window before the failure rate is evaluated
    pub minimum_calls: u32,

    /// Trial calls admitted (and successes required) while half-open
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    /// Create configuration for outbound calls to a peer service
    pub fn for_external_api() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.call_timeout.is_zero() {
            return Err("call_timeout must be greater than 0".to_string());
        }

        if self.failure_threshold_percent == 0 || self.failure_threshold_percent > 100 {
            return Err("failure_threshold_percent must be within 1..=100".to_string());
        }

        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }

        if self.rolling_window_size == 0 {
            return Err("rolling_window_size must be greater than 0".to_string());
        }

        if self.minimum_calls == 0 || self.minimum_calls > self.rolling_window_size {
            return Err("minimum_calls must be within 1..=rolling_window_size".to_string());
        }

        if self.half_open_max_calls == 0 {
            return Err("half_open_max_calls must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            failure_threshold_percent: 50,
            reset_timeout: Duration::from_secs(10),
            rolling_window_size: 10,
            minimum_calls: 1,
            half_open_max_calls: 1,
        }
    }
}
