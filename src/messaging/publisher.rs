//! # Lifecycle Event Publisher
//!
//! Best-effort publication of order lifecycle events. A publish failure is
//! logged and reported through [`PublishOutcome`] but never propagated: the
//! business operation that triggered it has already committed.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::RoutingKey;
use crate::logging::log_event_operation;
use crate::messaging::message::LifecycleEvent;
use crate::messaging::service::MessagingService;

/// What happened to a best-effort publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// No broker channel established yet; the event was skipped
    NoChannel,
    /// Serialization or broker error; the event was dropped
    Failed,
}

/// Publishes snapshots to the topic exchange once a broker is attached
///
/// Clones share the same channel slot, so attaching the broker after a
/// background connect makes every clone start publishing.
#[derive(Clone)]
pub struct EventPublisher {
    exchange: String,
    channel: Arc<RwLock<Option<Arc<dyn MessagingService>>>>,
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("exchange", &self.exchange)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl EventPublisher {
    /// Create a publisher with no channel attached
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            channel: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a publisher already attached to `service`
    pub fn with_service(exchange: impl Into<String>, service: Arc<dyn MessagingService>) -> Self {
        let publisher = Self::new(exchange);
        publisher.attach(service);
        publisher
    }

    pub fn attach(&self, service: Arc<dyn MessagingService>) {
        *self.channel.write() = Some(service);
    }

    pub fn detach(&self) {
        *self.channel.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.channel.read().is_some()
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish a JSON snapshot of `record` under `routing_key`
    ///
    /// At most one attempt; never retried.
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: RoutingKey,
        record_id: &str,
        record: &T,
    ) -> PublishOutcome {
        let Some(service) = self.channel.read().clone() else {
            warn!(
                routing_key = %routing_key,
                record_id = %record_id,
                "No broker channel, lifecycle event not published"
            );
            return PublishOutcome::NoChannel;
        };

        let event = match LifecycleEvent::from_snapshot(routing_key, record) {
            Ok(event) => event,
            Err(err) => {
                log_event_operation("publish", routing_key.as_str(), record_id, "serialize_failed", Some(&err.to_string()));
                return PublishOutcome::Failed;
            }
        };

        match service.publish(&self.exchange, &event).await {
            Ok(()) => {
                debug!(exchange = %self.exchange, provider = service.provider_name(), "Event published");
                log_event_operation("publish", routing_key.as_str(), record_id, "published", None);
                PublishOutcome::Published
            }
            Err(err) => {
                log_event_operation("publish", routing_key.as_str(), record_id, "failed", Some(&err.to_string()));
                PublishOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryMessagingService;
    use serde_json::json;

    async fn bound_service() -> Arc<InMemoryMessagingService> {
        let service = Arc::new(InMemoryMessagingService::new());
        service.ensure_exchange("app.topic").await.unwrap();
        service
            .ensure_queue("audit.q", "app.topic", &["order.#".to_string()])
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn test_publish_without_channel_is_skipped() {
        let publisher = EventPublisher::new("app.topic");
        let outcome = publisher
            .publish(RoutingKey::OrderCreated, "o-1", &json!({"id": "o-1"}))
            .await;
        assert_eq!(outcome, PublishOutcome::NoChannel);
    }

    #[tokio::test]
    async fn test_publish_after_attach_reaches_bound_queue() {
        let service = bound_service().await;
        let publisher = EventPublisher::new("app.topic");
        let clone = publisher.clone();
        publisher.attach(service.clone());

        let outcome = clone
            .publish(RoutingKey::OrderCancelled, "o-2", &json!({"id": "o-2", "status": "cancelled"}))
            .await;

        assert_eq!(outcome, PublishOutcome::Published);
        let message = service.take_next("audit.q").unwrap();
        assert_eq!(message.routing_key, "order.cancelled");
        assert_eq!(message.json().unwrap()["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_broker_failure_is_swallowed() {
        let service = bound_service().await;
        service.set_connected(false);
        let publisher = EventPublisher::with_service("app.topic", service.clone());

        let outcome = publisher
            .publish(RoutingKey::OrderCreated, "o-3", &json!({"id": "o-3"}))
            .await;

        assert_eq!(outcome, PublishOutcome::Failed);
        assert_eq!(service.queue_length("audit.q"), 0);
    }
}
