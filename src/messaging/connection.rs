//! # Broker Connection
//!
//! Bounded, capped exponential backoff around broker connection attempts.
//!
//! A broker that is still starting (typical under docker-compose) is retried
//! `max_retries` times after the first attempt, waiting
//! `min(base × 2^(retry-1), max)` between attempts. Exhaustion is reported
//! to the caller, which keeps the process running in degraded mode.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::messaging::service::{MessagingService, RabbitMqMessagingService};
use crate::messaging::{MessagingError, MessagingResult};

/// Reconnection schedule for the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionBackoff {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConnectionBackoff {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl ConnectionBackoff {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("connection base delay must be greater than 0".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err(format!(
                "connection max delay ({:?}) must be at least the base delay ({:?})",
                self.max_delay, self.base_delay
            ));
        }
        Ok(())
    }

    /// Total connection attempts, the first one included
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `connect` until it succeeds or the retries are spent
    pub async fn retry<F, Fut, T>(&self, target: &str, mut connect: F) -> MessagingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MessagingResult<T>>,
    {
        let mut retry = 0u32;
        loop {
            match connect().await {
                Ok(value) => {
                    if retry > 0 {
                        info!(target_name = %target, retries = retry, "Connected after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if retry >= self.max_retries => {
                    error!(
                        target_name = %target,
                        attempts = self.total_attempts(),
                        error = %err,
                        "Giving up on connection"
                    );
                    return Err(MessagingError::connection(format!(
                        "{} unreachable after {} attempts: {}",
                        target,
                        self.total_attempts(),
                        err
                    )));
                }
                Err(err) => {
                    retry += 1;
                    let delay = self.delay_for_retry(retry);
                    warn!(
                        target_name = %target,
                        retry = retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Connect to the broker with backoff and assert the topic exchange
pub async fn connect_with_backoff(
    config: &BrokerConfig,
) -> MessagingResult<Arc<dyn MessagingService>> {
    let backoff = config.connection.backoff();
    let service = backoff
        .retry("rabbitmq", || RabbitMqMessagingService::connect(config))
        .await?;
    service.ensure_exchange(&config.exchange).await?;
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule_is_capped() {
        let backoff = ConnectionBackoff::default();
        assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(300));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(600));
        assert_eq!(backoff.delay_for_retry(5), Duration::from_millis(4800));
        assert_eq!(backoff.delay_for_retry(7), Duration::from_secs(15));
        assert_eq!(backoff.delay_for_retry(200), Duration::from_secs(15));
        assert_eq!(backoff.total_attempts(), 6);
    }

    #[test]
    fn test_validation() {
        assert!(ConnectionBackoff::default().validate().is_ok());
        let inverted = ConnectionBackoff {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(1),
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_six_attempts() {
        let backoff = ConnectionBackoff::default();
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result: MessagingResult<()> = backoff
            .retry("broker", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(MessagingError::connection("refused")) }
            })
            .await;

        assert!(matches!(result, Err(MessagingError::Connection { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        // 300 + 600 + 1200 + 2400 + 4800
        assert_eq!(start.elapsed(), Duration::from_millis(9300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_when_broker_comes_up() {
        let backoff = ConnectionBackoff::default();
        let attempts = AtomicU32::new(0);

        let result = backoff
            .retry("broker", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(MessagingError::connection("refused"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }
}
