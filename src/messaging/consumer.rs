//! # Event Consumer
//!
//! Long-running loop that drains one queue with manual acknowledgment.
//!
//! Each delivery goes to an [`EventHandler`]. A handler success acks the
//! message; a handler error (or panic) nacks it without requeue so a poison
//! message cannot loop forever. Ack and nack failures are logged and the loop
//! keeps going. The loop ends on shutdown, when the delivery stream closes,
//! or on a transport error from the stream.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::messaging::message::InboundMessage;
use crate::messaging::service::MessagingService;
use crate::messaging::{MessagingError, MessagingResult};

/// Processes one delivery; the consumer settles it from the result
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, message: &InboundMessage) -> MessagingResult<()>;

    fn handler_name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    settle_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub acked: u64,
    pub nacked: u64,
    /// Ack or nack calls the broker rejected
    pub settle_failures: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
        }
    }
}

/// Resolves once the flag is `true` or its sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // `watch::Ref` is not Send and must not outlive this call
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct EventConsumer {
    service: Arc<dyn MessagingService>,
    queue_name: String,
    handler: Arc<dyn EventHandler>,
    stats: Arc<ConsumerStats>,
}

impl EventConsumer {
    pub fn new(
        service: Arc<dyn MessagingService>,
        queue_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            service,
            queue_name: queue_name.into(),
            handler,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// Shared counters, readable while the loop runs
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the loop on its own task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<MessagingResult<()>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consume until shutdown, end of stream, or a transport error
    ///
    /// Shutdown is a `true` on the watch channel, observed even when it was
    /// set before the loop started. A dropped sender also stops the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> MessagingResult<()> {
        if *shutdown.borrow() {
            info!(queue = %self.queue_name, "Shutdown already requested, consumer not started");
            return Ok(());
        }

        let mut deliveries = self.service.subscribe(&self.queue_name).await?;
        info!(
            queue = %self.queue_name,
            handler = self.handler.handler_name(),
            provider = self.service.provider_name(),
            "Event consumer started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => {
                    info!(queue = %self.queue_name, "Event consumer received shutdown signal");
                    return Ok(());
                }
                next = deliveries.next() => match next {
                    Some(Ok(message)) => self.process(message).await,
                    Some(Err(err)) => {
                        error!(queue = %self.queue_name, error = %err, "Delivery stream failed, consumer stopping");
                        return Err(err);
                    }
                    None => {
                        info!(queue = %self.queue_name, "Delivery stream closed, consumer stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn process(&self, message: InboundMessage) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        debug!(
            queue = %self.queue_name,
            routing_key = %message.routing_key,
            delivery = %message.receipt,
            redelivered = message.redelivered,
            "Processing delivery"
        );

        let outcome = AssertUnwindSafe(self.handler.handle(&message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(MessagingError::handler("handler panicked")));

        match outcome {
            Ok(()) => match self.service.ack(&self.queue_name, &message.receipt).await {
                Ok(()) => {
                    self.stats.acked.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.stats.settle_failures.fetch_add(1, Ordering::Relaxed);
                    error!(queue = %self.queue_name, delivery = %message.receipt, error = %err, "Ack failed");
                }
            },
            Err(handler_err) => {
                warn!(
                    queue = %self.queue_name,
                    routing_key = %message.routing_key,
                    delivery = %message.receipt,
                    error = %handler_err,
                    "Handler failed, dropping message"
                );
                match self.service.nack(&self.queue_name, &message.receipt, false).await {
                    Ok(()) => {
                        self.stats.nacked.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        self.stats.settle_failures.fetch_add(1, Ordering::Relaxed);
                        error!(queue = %self.queue_name, delivery = %message.receipt, error = %err, "Nack failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryMessagingService, LifecycleEvent};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Accepts JSON objects, rejects anything else, panics on `"boom"`
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, message: &InboundMessage) -> MessagingResult<()> {
            if message.payload == b"\"boom\"" {
                panic!("boom");
            }
            let body = message.json()?;
            self.seen.lock().push(body.to_string());
            Ok(())
        }

        fn handler_name(&self) -> &'static str {
            "recording"
        }
    }

    async fn setup() -> Arc<InMemoryMessagingService> {
        let service = Arc::new(InMemoryMessagingService::new());
        service.ensure_exchange("app.topic").await.unwrap();
        service
            .ensure_queue("orders.q", "app.topic", &["entity.*".to_string()])
            .await
            .unwrap();
        service
    }

    async fn wait_for_settled(stats: &ConsumerStats, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = stats.snapshot();
                if snapshot.acked + snapshot.nacked >= expected {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("consumer did not settle messages in time");
    }

    #[tokio::test]
    async fn test_malformed_message_is_nacked_and_loop_survives() {
        let service = setup().await;
        let handler = Arc::new(RecordingHandler::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = EventConsumer::new(service.clone(), "orders.q", handler.clone());
        let stats = consumer.stats();
        let task = consumer.spawn(shutdown_rx);

        for payload in [&b"{not json"[..], &b"\"boom\""[..], &br#"{"id":"u1"}"#[..]] {
            service
                .publish("app.topic", &LifecycleEvent::raw("entity.created", payload.to_vec()))
                .await
                .unwrap();
        }

        wait_for_settled(&stats, 3).await;
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.nacked, 2);
        assert_eq!(snapshot.acked, 1);
        assert_eq!(handler.seen.lock().len(), 1);
        assert_eq!(service.queue_stats("orders.q").unwrap().dropped, 2);
        assert_eq!(service.unacked_count("orders.q"), 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_consumer() {
        let service = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = EventConsumer::new(service, "orders.q", Arc::new(RecordingHandler::default()))
            .spawn(shutdown_rx);

        drop(shutdown_tx);
        let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_consumer_started_after_shutdown_exits() {
        let service = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let task = EventConsumer::new(service.clone(), "orders.q", Arc::new(RecordingHandler::default()))
            .spawn(shutdown_rx);
        let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(result.unwrap().is_ok());

        service
            .publish("app.topic", &LifecycleEvent::raw("entity.created", br#"{"id":"u1"}"#.to_vec()))
            .await
            .unwrap();
        assert_eq!(service.queue_length("orders.q"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_after_subscribe_stops_busy_consumer() {
        let service = setup().await;
        let handler = Arc::new(RecordingHandler::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = EventConsumer::new(service.clone(), "orders.q", handler.clone());
        let stats = consumer.stats();
        let task = consumer.spawn(shutdown_rx);

        service
            .publish("app.topic", &LifecycleEvent::raw("entity.updated", br#"{"id":"u2"}"#.to_vec()))
            .await
            .unwrap();
        wait_for_settled(&stats, 1).await;

        shutdown_tx.send_replace(true);
        let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(result.unwrap().is_ok());
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_returned() {
        let service = Arc::new(InMemoryMessagingService::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = EventConsumer::new(service, "missing.q", Arc::new(RecordingHandler::default()))
            .run(shutdown_rx)
            .await;
        assert!(matches!(result, Err(MessagingError::Receive { .. })));
    }
}
