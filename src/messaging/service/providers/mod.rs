//! # Messaging Providers

mod in_memory;
mod rabbitmq;

pub use in_memory::{topic_matches, InMemoryMessagingService, InMemoryQueueStats};
pub use rabbitmq::RabbitMqMessagingService;
