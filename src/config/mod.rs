//! # Orders Core Configuration System
//!
//! Every option the resilience layer consumes, with defaults that let the core
//! run without any configuration file at all.
//!
//! ## Architecture
//!
//! - **Layered Sources**: defaults, optional TOML file, `ORDERS__*` variables, legacy flat variables
//! - **Explicit Validation**: invalid values are rejected at load time, never clamped
//! - **Millisecond Durations**: every timeout and delay is configured in milliseconds
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orders_core::config::OrdersConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrdersConfig::load()?;
//!
//! let exchange = &config.broker.exchange;
//! let retry = config.retry.policy()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::RoutingKey;
use crate::messaging::ConnectionBackoff;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

pub use error::{ConfigResult, ConfigurationError};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrdersConfig {
    /// Message broker connection and topology
    pub broker: BrokerConfig,

    /// Remote peer used for foreign key validation
    pub peer: PeerConfig,

    /// Circuit breaker guarding the peer validation call
    pub circuit_breaker: CircuitBreakerSettings,

    /// Retry policy for the peer validation call
    pub retry: RetrySettings,
}

/// Broker connection, exchange/queue names and consumed routing keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: String,
    pub exchange: String,
    pub queue: String,
    pub connection_name: String,
    pub prefetch_count: u16,
    /// Routing key consumed to learn about newly created peer entities
    pub entity_created_routing_key: String,
    /// Routing key consumed to learn about updated peer entities
    pub entity_updated_routing_key: String,
    pub connection: ConnectionBackoffSettings,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://guest:guest@ms_rabbitmq:5672".to_string(),
            exchange: "app.topic".to_string(),
            queue: "orders.q".to_string(),
            connection_name: "orders-core".to_string(),
            prefetch_count: 1,
            entity_created_routing_key: RoutingKey::EntityCreated.as_str().to_string(),
            entity_updated_routing_key: RoutingKey::EntityUpdated.as_str().to_string(),
            connection: ConnectionBackoffSettings::default(),
        }
    }
}

impl BrokerConfig {
    /// Routing keys the orders queue is bound to
    pub fn consumed_routing_keys(&self) -> Vec<String> {
        vec![
            self.entity_created_routing_key.clone(),
            self.entity_updated_routing_key.clone(),
        ]
    }
}

/// Backoff applied while establishing the broker connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionBackoffSettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ConnectionBackoffSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 300,
            max_delay_ms: 15_000,
        }
    }
}

impl ConnectionBackoffSettings {
    pub fn backoff(&self) -> ConnectionBackoff {
        ConnectionBackoff {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Peer service answering lookup-by-id validation calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Name used in logs, breaker identification and unavailability errors
    pub name: String,
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "users-service".to_string(),
            base_url: "http://localhost:3001".to_string(),
            request_timeout_ms: 2_000,
        }
    }
}

impl PeerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Circuit breaker options as they appear in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Per-call timeout enforced by the breaker
    pub call_timeout_ms: u64,
    /// Failure percentage over the rolling window that opens the circuit
    pub error_threshold_percent: u8,
    /// Time spent open before a half-open probe is admitted
    pub reset_timeout_ms: u64,
    pub rolling_window_size: u32,
    pub minimum_calls: u32,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2_000,
            error_threshold_percent: 50,
            reset_timeout_ms: 10_000,
            rolling_window_size: 10,
            minimum_calls: 1,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerSettings {
    /// Build the runtime breaker configuration, validating it on the way
    pub fn breaker_config(&self) -> ConfigResult<CircuitBreakerConfig> {
        let config = CircuitBreakerConfig {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            failure_threshold_percent: self.error_threshold_percent,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            rolling_window_size: self.rolling_window_size,
            minimum_calls: self.minimum_calls,
            half_open_max_calls: self.half_open_max_calls,
        };
        config
            .validate()
            .map_err(|reason| ConfigurationError::invalid_value("circuit_breaker", format!("{self:?}"), reason))?;
        Ok(config)
    }
}

/// Retry options for the peer validation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 400,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> ConfigResult<RetryPolicy> {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms)).map_err(
            |reason| {
                ConfigurationError::invalid_value(
                    "retry.max_attempts",
                    self.max_attempts.to_string(),
                    reason,
                )
            },
        )
    }
}

impl OrdersConfig {
    /// Validate every section, reporting the first invalid field
    pub fn validate(&self) -> ConfigResult<()> {
        let non_empty = [
            ("broker.url", &self.broker.url),
            ("broker.exchange", &self.broker.exchange),
            ("broker.queue", &self.broker.queue),
            (
                "broker.entity_created_routing_key",
                &self.broker.entity_created_routing_key,
            ),
            (
                "broker.entity_updated_routing_key",
                &self.broker.entity_updated_routing_key,
            ),
            ("peer.name", &self.peer.name),
            ("peer.base_url", &self.peer.base_url),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.as_str(),
                    "must not be empty",
                ));
            }
        }

        if self.broker.prefetch_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "broker.prefetch_count",
                "0",
                "must be at least 1 so deliveries are pulled one at a time",
            ));
        }

        self.broker
            .connection
            .backoff()
            .validate()
            .map_err(|reason| {
                ConfigurationError::invalid_value(
                    "broker.connection",
                    format!("{:?}", self.broker.connection),
                    reason,
                )
            })?;

        if self.peer.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "peer.request_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }

        self.circuit_breaker.breaker_config()?;
        self.retry.policy()?;
        Ok(())
    }
}
