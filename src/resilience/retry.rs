//! # Retry With Exponential Backoff
//!
//! Bounded retry around any fallible async operation. The delay before retry
//! `n` is `base_delay × 2^(n-1)`, with no jitter, and the final failed attempt
//! is propagated immediately without sleeping.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Immutable retry parameters, passed per call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` counts the first try and must be at least 1
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, String> {
        if max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay slept after failed attempt `attempt` (1-indexed) before the next one
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
        }
    }
}

/// Executes operations under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    /// Operation name for logging
    name: String,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the policy's attempts are exhausted
    ///
    /// Returns the error of the last attempt on exhaustion.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = %self.name,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        error!(
                            operation = %self.name,
                            attempts = attempt,
                            error = %err,
                            "All retry attempts failed"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_after_attempt(attempt);
                    warn!(
                        operation = %self.name,
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_policy_rejects_zero_attempts() {
        assert!(RetryPolicy::new(0, Duration::from_millis(10)).is_err());
        assert!(RetryPolicy::new(1, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500)).unwrap();
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after_attempt(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1)).unwrap();
        assert_eq!(policy.delay_after_attempt(64), Duration::MAX);
    }

    proptest! {
        #[test]
        fn prop_delay_grows_strictly(base_ms in 1u64..10_000, attempt in 1u32..20) {
            let policy = RetryPolicy::new(30, Duration::from_millis(base_ms)).unwrap();
            prop_assert!(policy.delay_after_attempt(attempt + 1) > policy.delay_after_attempt(attempt));
            prop_assert_eq!(
                policy.delay_after_attempt(attempt),
                Duration::from_millis(base_ms) * 2u32.pow(attempt - 1)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(
            "flaky",
            RetryPolicy::new(4, Duration::from_millis(100)).unwrap(),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<&str, String> = executor
            .execute(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 {
                        Err(format!("failure {n}"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_without_trailing_delay() {
        let executor = RetryExecutor::new(
            "always_failing",
            RetryPolicy::new(3, Duration::from_millis(50)).unwrap(),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), String> = executor
            .execute(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(format!("failure {n}"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_sleeps() {
        let executor = RetryExecutor::new(
            "once",
            RetryPolicy::new(1, Duration::from_secs(60)).unwrap(),
        );
        let result: Result<(), &str> = executor.execute(|| async { Err("nope") }).await;
        assert_eq!(result.unwrap_err(), "nope");
    }
}
