//! # Messaging Service Abstraction Layer
//!
//! ```text
//! Arc<dyn MessagingService>
//!   ├── RabbitMqMessagingService   (lapin, AMQP 0.9.1)
//!   └── InMemoryMessagingService   (topic routing in process, for tests)
//! ```
//!
//! Publishers and consumers hold the trait object so the broker can be
//! attached after startup, or replaced with the in-memory provider in tests.

pub mod providers;
mod traits;

pub use providers::{InMemoryMessagingService, InMemoryQueueStats, RabbitMqMessagingService};
pub use traits::{DeliveryStream, MessagingService};
