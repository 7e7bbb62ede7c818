//! # Messaging Service Traits
//!
//! Provider-agnostic operations against a topic exchange: topology
//! declaration, publish, push subscription and delivery acknowledgment.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::messaging::message::{InboundMessage, LifecycleEvent, ReceiptHandle};
use crate::messaging::MessagingResult;

/// Push-delivered messages for one queue, in broker order
pub type DeliveryStream = BoxStream<'static, MessagingResult<InboundMessage>>;

/// Core messaging service trait
///
/// Implementations provide the actual backend (RabbitMQ, InMemory). Every
/// declaration is idempotent so it can run on each startup.
#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Declare a durable topic exchange if it doesn't exist
    async fn ensure_exchange(&self, exchange: &str) -> MessagingResult<()>;

    /// Declare a durable queue and bind it to `exchange` once per routing key
    async fn ensure_queue(
        &self,
        queue_name: &str,
        exchange: &str,
        routing_keys: &[String],
    ) -> MessagingResult<()>;

    /// Publish an event to `exchange` under its routing key
    async fn publish(&self, exchange: &str, event: &LifecycleEvent) -> MessagingResult<()>;

    /// Start push delivery from a queue with manual acknowledgment
    async fn subscribe(&self, queue_name: &str) -> MessagingResult<DeliveryStream>;

    /// Acknowledge a delivery, removing it from the queue
    async fn ack(&self, queue_name: &str, receipt: &ReceiptHandle) -> MessagingResult<()>;

    /// Negatively acknowledge a delivery; dropped unless `requeue` is set
    async fn nack(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
        requeue: bool,
    ) -> MessagingResult<()>;

    /// Whether the underlying connection is usable
    async fn health_check(&self) -> MessagingResult<bool>;

    /// Get the provider name for logging
    fn provider_name(&self) -> &'static str;
}
