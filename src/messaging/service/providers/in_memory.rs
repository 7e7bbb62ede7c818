//! # In-Memory Messaging Provider
//!
//! Thread-safe in-process topic exchange for testing and development.
//!
//! Mirrors the broker semantics the service relies on: topic bindings with
//! `*` and `#` wildcards, FIFO queues, push delivery to a subscriber, manual
//! ack, and nack with or without requeue. Unroutable publishes are dropped
//! as a non-mandatory AMQP publish would be.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::messaging::message::{InboundMessage, LifecycleEvent, ReceiptHandle};
use crate::messaging::service::traits::{DeliveryStream, MessagingService};
use crate::messaging::{MessagingError, MessagingResult};

/// Per-queue counters, for assertions in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryQueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    /// Nacked without requeue
    pub dropped: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct InMemoryQueue {
    /// (exchange, binding pattern)
    bindings: Vec<(String, String)>,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
    next_tag: u64,
    stats: InMemoryQueueStats,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            bindings: Vec::new(),
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            next_tag: 1,
            stats: InMemoryQueueStats::default(),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryBroker {
    exchanges: HashSet<String>,
    queues: HashMap<String, InMemoryQueue>,
    unroutable: u64,
}

impl InMemoryBroker {
    fn take_next(&mut self, queue_name: &str) -> Option<InboundMessage> {
        let queue = self.queues.get_mut(queue_name)?;
        let message = queue.ready.pop_front()?;
        let tag = queue.next_tag;
        queue.next_tag += 1;
        queue.stats.delivered += 1;
        queue.unacked.insert(tag, message.clone());

        Some(InboundMessage {
            routing_key: message.routing_key,
            payload: message.payload,
            redelivered: message.redelivered,
            receipt: ReceiptHandle::from(tag),
        })
    }
}

/// In-memory messaging service for testing
///
/// # Example
///
/// ```rust
/// use orders_core::messaging::{InMemoryMessagingService, LifecycleEvent, MessagingService};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = InMemoryMessagingService::new();
/// service.ensure_exchange("app.topic").await?;
/// service.ensure_queue("orders.q", "app.topic", &["entity.*".to_string()]).await?;
///
/// let mut deliveries = service.subscribe("orders.q").await?;
/// service
///     .publish("app.topic", &LifecycleEvent::raw("entity.created", br#"{"id":"u1"}"#.to_vec()))
///     .await?;
///
/// if let Some(Ok(message)) = deliveries.next().await {
///     service.ack("orders.q", &message.receipt).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryMessagingService {
    broker: Arc<Mutex<InMemoryBroker>>,
    connected: AtomicBool,
}

impl Default for InMemoryMessagingService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessagingService {
    /// Create a new in-memory messaging service
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Mutex::new(InMemoryBroker::default())),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the broker connection
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Messages waiting for delivery (for testing)
    pub fn queue_length(&self, queue_name: &str) -> usize {
        self.broker
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Delivered messages not yet acked or nacked (for testing)
    pub fn unacked_count(&self, queue_name: &str) -> usize {
        self.broker
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Counters for a queue, if it has been declared
    pub fn queue_stats(&self, queue_name: &str) -> Option<InMemoryQueueStats> {
        self.broker.lock().queues.get(queue_name).map(|q| q.stats)
    }

    /// Publishes that matched no binding
    pub fn unroutable_count(&self) -> u64 {
        self.broker.lock().unroutable
    }

    /// Pop the next ready message without a subscription (for testing)
    ///
    /// The message is held unacked like a pushed delivery.
    pub fn take_next(&self, queue_name: &str) -> Option<InboundMessage> {
        self.broker.lock().take_next(queue_name)
    }

    fn ensure_connected(&self) -> MessagingResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::NotConnected)
        }
    }

    fn settle(&self, queue_name: &str, receipt: &ReceiptHandle) -> MessagingResult<(u64, StoredMessage)> {
        let tag: u64 = receipt.as_str().parse().map_err(|_| {
            MessagingError::internal(format!("invalid delivery tag: {}", receipt.as_str()))
        })?;
        let mut broker = self.broker.lock();
        let queue = broker
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::receive(queue_name, "queue not declared"))?;
        let message = queue
            .unacked
            .remove(&tag)
            .ok_or_else(|| MessagingError::internal(format!("unknown delivery tag: {tag}")))?;
        Ok((tag, message))
    }
}

/// Match a routing key against an AMQP topic binding pattern
///
/// Words are dot-separated; `*` matches exactly one word and `#` matches
/// zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| match_words(rest, &words[skip..])),
        Some((&"*", rest)) => !words.is_empty() && match_words(rest, &words[1..]),
        Some((literal, rest)) => words.first() == Some(literal) && match_words(rest, &words[1..]),
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_exchange(&self, exchange: &str) -> MessagingResult<()> {
        self.ensure_connected()?;
        self.broker.lock().exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn ensure_queue(
        &self,
        queue_name: &str,
        exchange: &str,
        routing_keys: &[String],
    ) -> MessagingResult<()> {
        self.ensure_connected()?;
        let mut broker = self.broker.lock();
        if !broker.exchanges.contains(exchange) {
            return Err(MessagingError::topology(
                queue_name,
                format!("cannot bind to undeclared exchange {exchange}"),
            ));
        }

        let queue = broker
            .queues
            .entry(queue_name.to_string())
            .or_insert_with(InMemoryQueue::new);
        for routing_key in routing_keys {
            let binding = (exchange.to_string(), routing_key.clone());
            if !queue.bindings.contains(&binding) {
                queue.bindings.push(binding);
            }
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, event: &LifecycleEvent) -> MessagingResult<()> {
        self.ensure_connected()?;
        let mut broker = self.broker.lock();
        if !broker.exchanges.contains(exchange) {
            return Err(MessagingError::publish(
                exchange,
                &event.routing_key,
                "exchange not declared",
            ));
        }

        let mut routed = false;
        for queue in broker.queues.values_mut() {
            let bound = queue
                .bindings
                .iter()
                .any(|(ex, pattern)| ex == exchange && topic_matches(pattern, &event.routing_key));
            if bound {
                queue.ready.push_back(StoredMessage {
                    routing_key: event.routing_key.clone(),
                    payload: event.payload.clone(),
                    redelivered: false,
                });
                queue.stats.enqueued += 1;
                queue.notify.notify_one();
                routed = true;
            }
        }

        if !routed {
            broker.unroutable += 1;
        }
        Ok(())
    }

    async fn subscribe(&self, queue_name: &str) -> MessagingResult<DeliveryStream> {
        self.ensure_connected()?;
        let notify = self
            .broker
            .lock()
            .queues
            .get(queue_name)
            .map(|q| Arc::clone(&q.notify))
            .ok_or_else(|| MessagingError::receive(queue_name, "queue not declared"))?;

        let state = (Arc::clone(&self.broker), queue_name.to_string(), notify);
        let stream = futures::stream::unfold(state, |(broker, queue, notify)| async move {
            loop {
                let next = broker.lock().take_next(&queue);
                match next {
                    Some(message) => return Some((Ok(message), (broker, queue, notify))),
                    None => notify.notified().await,
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ack(&self, queue_name: &str, receipt: &ReceiptHandle) -> MessagingResult<()> {
        self.ensure_connected()
            .map_err(|e| MessagingError::ack(queue_name, receipt.as_str(), e.to_string()))?;
        self.settle(queue_name, receipt)?;
        if let Some(queue) = self.broker.lock().queues.get_mut(queue_name) {
            queue.stats.acked += 1;
        }
        Ok(())
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
        requeue: bool,
    ) -> MessagingResult<()> {
        self.ensure_connected()
            .map_err(|e| MessagingError::nack(queue_name, receipt.as_str(), e.to_string()))?;
        let (_, mut message) = self.settle(queue_name, receipt)?;

        let mut broker = self.broker.lock();
        if let Some(queue) = broker.queues.get_mut(queue_name) {
            queue.stats.nacked += 1;
            if requeue {
                message.redelivered = true;
                queue.ready.push_front(message);
                queue.notify.notify_one();
            } else {
                queue.stats.dropped += 1;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        self.ensure_connected()
            .map(|_| true)
            .map_err(|_| MessagingError::health_check("in-memory broker disconnected"))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn declared(routing_keys: &[&str]) -> InMemoryMessagingService {
        let service = InMemoryMessagingService::new();
        service.ensure_exchange("app.topic").await.unwrap();
        let keys: Vec<String> = routing_keys.iter().map(|k| k.to_string()).collect();
        service.ensure_queue("orders.q", "app.topic", &keys).await.unwrap();
        service
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("entity.created", "entity.created"));
        assert!(!topic_matches("entity.created", "entity.updated"));
        assert!(topic_matches("entity.*", "entity.updated"));
        assert!(!topic_matches("entity.*", "entity.updated.v2"));
        assert!(topic_matches("#", "order.created"));
        assert!(topic_matches("entity.#", "entity"));
        assert!(topic_matches("*.created", "order.created"));
        assert!(topic_matches("#.created", "a.b.created"));
        assert!(!topic_matches("order.*", "entity.created"));
    }

    #[tokio::test]
    async fn test_publish_routes_only_bound_keys() {
        let service = declared(&["entity.created", "entity.updated"]).await;

        service
            .publish("app.topic", &LifecycleEvent::raw("entity.created", b"{}".to_vec()))
            .await
            .unwrap();
        service
            .publish("app.topic", &LifecycleEvent::raw("entity.deleted", b"{}".to_vec()))
            .await
            .unwrap();

        assert_eq!(service.queue_length("orders.q"), 1);
        assert_eq!(service.unroutable_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_exchange_fails() {
        let service = InMemoryMessagingService::new();
        let result = service
            .publish("missing", &LifecycleEvent::raw("order.created", b"{}".to_vec()))
            .await;
        assert!(matches!(result, Err(MessagingError::Publish { .. })));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_and_ack_settles() {
        let service = declared(&["entity.*"]).await;
        let mut deliveries = service.subscribe("orders.q").await.unwrap();

        service
            .publish("app.topic", &LifecycleEvent::raw("entity.updated", br#"{"id":"u1"}"#.to_vec()))
            .await
            .unwrap();

        let message = deliveries.next().await.unwrap().unwrap();
        assert_eq!(message.routing_key, "entity.updated");
        assert!(!message.redelivered);
        assert_eq!(service.unacked_count("orders.q"), 1);

        service.ack("orders.q", &message.receipt).await.unwrap();
        assert_eq!(service.unacked_count("orders.q"), 0);
        let stats = service.queue_stats("orders.q").unwrap();
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_nack_with_and_without_requeue() {
        let service = declared(&["entity.created"]).await;
        service
            .publish("app.topic", &LifecycleEvent::raw("entity.created", b"x".to_vec()))
            .await
            .unwrap();

        let first = service.take_next("orders.q").unwrap();
        service.nack("orders.q", &first.receipt, true).await.unwrap();
        assert_eq!(service.queue_length("orders.q"), 1);

        let second = service.take_next("orders.q").unwrap();
        assert!(second.redelivered);
        service.nack("orders.q", &second.receipt, false).await.unwrap();

        assert_eq!(service.queue_length("orders.q"), 0);
        let stats = service.queue_stats("orders.q").unwrap();
        assert_eq!(stats.nacked, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_double_ack_is_rejected() {
        let service = declared(&["entity.created"]).await;
        service
            .publish("app.topic", &LifecycleEvent::raw("entity.created", b"x".to_vec()))
            .await
            .unwrap();
        let message = service.take_next("orders.q").unwrap();
        service.ack("orders.q", &message.receipt).await.unwrap();
        assert!(service.ack("orders.q", &message.receipt).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnected_service_fails_operations() {
        let service = declared(&["entity.created"]).await;
        service.set_connected(false);

        let publish = service
            .publish("app.topic", &LifecycleEvent::raw("order.created", b"{}".to_vec()))
            .await;
        assert!(matches!(publish, Err(MessagingError::NotConnected)));
        assert!(service.health_check().await.is_err());

        service.set_connected(true);
        assert!(service.health_check().await.unwrap());
    }
}
