//! # Resilience Module
//!
//! Fault tolerance for calls to a remote peer: bounded retry with exponential
//! backoff and a failure-rate circuit breaker with a per-call timeout.
//!
//! ## Architecture
//!
//! - **Retry**: deterministic `base × 2^(n-1)` backoff, last error propagated on exhaustion
//! - **Circuit Breakers**: fail fast while a peer is judged unhealthy, probe for recovery
//! - **Metrics Collection**: counters and rolling-window failure rate per breaker
//! - **Notifications**: broadcast state transitions for operational visibility
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orders_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("users-service", CircuitBreakerConfig::default());
//! let retry = RetryExecutor::new("users-lookup", RetryPolicy::new(3, Duration::from_millis(400))?);
//!
//! let result = breaker
//!     .call(|| retry.execute(|| async { Ok::<&str, String>("found") }))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitEvent, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
pub use retry::{RetryExecutor, RetryPolicy};
