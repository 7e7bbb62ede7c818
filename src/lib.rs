#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orders Core
//!
//! Resilience core for an orders service that references entities owned by a
//! peer service.
//!
//! ## Overview
//!
//! Creating an order requires confirming that the referenced entity exists in
//! the peer. The peer may be slow, flaky or down, so every lookup goes through
//! a bounded retry inside a failure-rate circuit breaker. When no
//! authoritative answer is possible, a local read-through cache, fed by the
//! peer's lifecycle events over a RabbitMQ topic exchange, decides whether the
//! order may still proceed. Order state changes are announced on the same
//! exchange, best effort.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Retry executor and circuit breaker
//! - [`peer`] - Lookup-by-id client for the peer service
//! - [`cache`] - Entity cache and the event handler that feeds it
//! - [`messaging`] - Broker abstraction, connection backoff, publisher and consumer
//! - [`orchestration`] - Foreign-key validation, order service and bootstrap
//! - [`persistence`] - Order repository boundary
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orders_core::config::OrdersConfig;
//! use orders_core::orchestration::OrdersCore;
//! use orders_core::persistence::{InMemoryOrderRepository, NewOrder};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrdersConfig::load()?;
//! let core = OrdersCore::bootstrap(config, Arc::new(InMemoryOrderRepository::new())).await?;
//!
//! let order = core
//!     .orders()
//!     .create_order(NewOrder {
//!         entity_id: "user-42".to_string(),
//!         items: vec![],
//!         total: 12.5,
//!     })
//!     .await?;
//! println!("created {}", order.id);
//!
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod peer;
pub mod persistence;
pub mod resilience;

pub use cache::{CachedEntity, EntityCacheHandler, ReadThroughCache};
pub use config::{ConfigurationError, OrdersConfig};
pub use constants::{OrderStatus, RoutingKey};
pub use error::{OrdersError, OrdersResult};
pub use messaging::{EventConsumer, EventPublisher, MessagingError, MessagingService};
pub use orchestration::{OrderService, OrdersCore, ValidationOrchestrator, ValidationOutcome};
pub use peer::{HttpPeerClient, PeerDirectory, PeerLookup};
pub use persistence::{InMemoryOrderRepository, NewOrder, Order, OrderRepository};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryExecutor, RetryPolicy};
