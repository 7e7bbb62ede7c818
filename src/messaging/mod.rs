//! # Messaging
//!
//! Topic-exchange messaging for order lifecycle events and inbound entity
//! events.
//!
//! ## Key Components
//!
//! - [`MessagingService`]: provider-agnostic broker operations (RabbitMQ, InMemory)
//! - [`connect_with_backoff`]: bounded capped-exponential broker connection
//! - [`EventPublisher`]: best-effort, fire-and-forget lifecycle publication
//! - [`EventConsumer`]: one-at-a-time consume loop with ack/nack settlement

pub mod connection;
pub mod consumer;
pub mod errors;
pub mod message;
pub mod publisher;
pub mod service;

pub use connection::{connect_with_backoff, ConnectionBackoff};
pub use consumer::{ConsumerStats, ConsumerStatsSnapshot, EventConsumer, EventHandler};
pub use errors::{MessagingError, MessagingResult};
pub use message::{InboundMessage, LifecycleEvent, ReceiptHandle};
pub use publisher::{EventPublisher, PublishOutcome};
pub use service::{
    DeliveryStream, InMemoryMessagingService, InMemoryQueueStats, MessagingService,
    RabbitMqMessagingService,
};
