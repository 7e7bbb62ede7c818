//! # Orders Core Bootstrap
//!
//! Assembles the order pipeline and manages its lifecycle.
//!
//! ## Key Features
//!
//! - **Degraded Start**: order handling is available immediately; the broker
//!   connects in the background with bounded backoff
//! - **Late Attachment**: once connected, the topology is asserted, the
//!   publisher is attached and the entity consumer starts
//! - **Health Reporting**: broker, breaker and cache state in one snapshot
//! - **Graceful Shutdown**: one watch flag stops the connector and the consumer,
//!   including a consumer that starts after the flag was raised

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::{EntityCacheHandler, ReadThroughCache};
use crate::config::loader::redact_url;
use crate::config::OrdersConfig;
use crate::error::OrdersResult;
use crate::messaging::consumer::shutdown_requested;
use crate::messaging::{
    connect_with_backoff, ConsumerStats, ConsumerStatsSnapshot, EventConsumer, EventPublisher,
    MessagingResult, MessagingService,
};
use crate::orchestration::orders::OrderService;
use crate::orchestration::validation::ValidationOrchestrator;
use crate::peer::{HttpPeerClient, PeerDirectory};
use crate::persistence::OrderRepository;
use crate::resilience::{CircuitBreakerMetrics, CircuitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but the broker is missing or the peer breaker is not closed
    Degraded,
}

/// Point-in-time view of the core's dependencies
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub broker_connected: bool,
    pub messaging_provider: Option<&'static str>,
    pub peer: String,
    pub circuit_state: CircuitState,
    pub circuit_breaker: CircuitBreakerMetrics,
    pub cached_entities: usize,
    pub consumer: Option<ConsumerStatsSnapshot>,
}

/// Running orders core
pub struct OrdersCore {
    config: OrdersConfig,
    cache: Arc<ReadThroughCache>,
    validator: Arc<ValidationOrchestrator>,
    orders: Arc<OrderService>,
    publisher: EventPublisher,
    messaging: RwLock<Option<Arc<dyn MessagingService>>>,
    consumer_stats: RwLock<Option<Arc<ConsumerStats>>>,
    shutdown_tx: watch::Sender<bool>,
    connect_task: Mutex<Option<JoinHandle<()>>>,
    consumer_task: Mutex<Option<JoinHandle<MessagingResult<()>>>>,
}

impl fmt::Debug for OrdersCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrdersCore")
            .field("broker_url", &redact_url(&self.config.broker.url))
            .field("validator", &self.validator)
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl OrdersCore {
    /// Assemble the core around the given peer and repository, without a broker
    pub fn new(
        config: OrdersConfig,
        peer: Arc<dyn PeerDirectory>,
        repository: Arc<dyn OrderRepository>,
    ) -> OrdersResult<Arc<Self>> {
        config.validate()?;

        let cache = Arc::new(ReadThroughCache::new());
        let validator = Arc::new(ValidationOrchestrator::from_config(
            &config,
            peer,
            Arc::clone(&cache),
        )?);
        let publisher = EventPublisher::new(config.broker.exchange.clone());
        let orders = Arc::new(OrderService::new(
            Arc::clone(&validator),
            repository,
            publisher.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            config,
            cache,
            validator,
            orders,
            publisher,
            messaging: RwLock::new(None),
            consumer_stats: RwLock::new(None),
            shutdown_tx,
            connect_task: Mutex::new(None),
            consumer_task: Mutex::new(None),
        }))
    }

    /// Build the production core: HTTP peer client plus a background broker connection
    pub async fn bootstrap(
        config: OrdersConfig,
        repository: Arc<dyn OrderRepository>,
    ) -> OrdersResult<Arc<Self>> {
        info!(
            broker = %redact_url(&config.broker.url),
            exchange = %config.broker.exchange,
            queue = %config.broker.queue,
            peer = %config.peer.base_url,
            "Bootstrapping orders core"
        );

        let peer = Arc::new(HttpPeerClient::new(&config.peer)?);
        let core = Self::new(config, peer, repository)?;
        core.spawn_broker_connection();
        Ok(core)
    }

    /// Connect to the broker on a background task
    ///
    /// Exhausted retries leave the core running without messaging.
    pub fn spawn_broker_connection(self: &Arc<Self>) {
        let core = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown before broker connection was established");
                }
                connected = connect_with_backoff(&core.config.broker) => match connected {
                    Ok(service) => {
                        if let Err(err) = core.attach_messaging(service).await {
                            error!(error = %err, "Broker connected but messaging setup failed, continuing degraded");
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "Broker unavailable, continuing without messaging");
                    }
                },
            }
        });

        if let Some(previous) = self.connect_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Assert topology, attach the publisher and start the entity consumer
    ///
    /// Does nothing once shutdown has been requested.
    pub async fn attach_messaging(&self, service: Arc<dyn MessagingService>) -> OrdersResult<()> {
        let broker = &self.config.broker;
        let routing_keys = broker.consumed_routing_keys();

        service.ensure_exchange(&broker.exchange).await?;
        service
            .ensure_queue(&broker.queue, &broker.exchange, &routing_keys)
            .await?;

        if self.is_shutting_down() {
            warn!(
                provider = service.provider_name(),
                "Shutdown requested, messaging not attached"
            );
            return Ok(());
        }

        self.publisher.attach(Arc::clone(&service));

        let handler = Arc::new(EntityCacheHandler::new(Arc::clone(&self.cache), routing_keys));
        let consumer = EventConsumer::new(Arc::clone(&service), broker.queue.clone(), handler);
        *self.consumer_stats.write() = Some(consumer.stats());
        let handle = consumer.spawn(self.shutdown_tx.subscribe());
        if let Some(previous) = self.consumer_task.lock().replace(handle) {
            previous.abort();
        }

        info!(
            provider = service.provider_name(),
            exchange = %broker.exchange,
            queue = %broker.queue,
            "Messaging attached"
        );
        *self.messaging.write() = Some(service);
        Ok(())
    }

    pub fn config(&self) -> &OrdersConfig {
        &self.config
    }

    pub fn orders(&self) -> &Arc<OrderService> {
        &self.orders
    }

    pub fn validator(&self) -> &Arc<ValidationOrchestrator> {
        &self.validator
    }

    pub fn cache(&self) -> &Arc<ReadThroughCache> {
        &self.cache
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn is_messaging_attached(&self) -> bool {
        self.messaging.read().is_some()
    }

    pub async fn health(&self) -> HealthReport {
        let messaging = self.messaging.read().clone();
        let (broker_connected, messaging_provider) = match messaging {
            Some(service) => {
                let connected = service.health_check().await.unwrap_or(false);
                (connected, Some(service.provider_name()))
            }
            None => (false, None),
        };

        let breaker = self.validator.breaker();
        let circuit_state = breaker.state();
        let status = if broker_connected && circuit_state == CircuitState::Closed {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            broker_connected,
            messaging_provider,
            peer: self.validator.peer_name().to_string(),
            circuit_state,
            circuit_breaker: breaker.metrics(),
            cached_entities: self.cache.len(),
            consumer: self
                .consumer_stats
                .read()
                .as_ref()
                .map(|stats| stats.snapshot()),
        }
    }

    /// Stop the connector and the consumer, then detach the publisher
    pub async fn shutdown(&self) {
        info!("Orders core shutdown requested");
        // Stored even with no receivers so later subscribers see it
        self.shutdown_tx.send_replace(true);

        let connect_task = self.connect_task.lock().take();
        if let Some(handle) = connect_task {
            if let Err(err) = handle.await {
                warn!(error = %err, "Broker connection task ended abnormally");
            }
        }

        let consumer_task = self.consumer_task.lock().take();
        if let Some(handle) = consumer_task {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "Consumer stopped with an error"),
                Err(err) => warn!(error = %err, "Consumer task ended abnormally"),
            }
        }

        self.publisher.detach();
        *self.messaging.write() = None;
        info!("Orders core stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryMessagingService;
    use crate::peer::{PeerError, PeerLookup};
    use crate::persistence::InMemoryOrderRepository;
    use async_trait::async_trait;
    use std::time::Duration;

    struct AbsentPeer;

    #[async_trait]
    impl PeerDirectory for AbsentPeer {
        async fn lookup(&self, _entity_id: &str) -> Result<PeerLookup, PeerError> {
            Ok(PeerLookup::NotFound)
        }

        fn peer_name(&self) -> &str {
            "absent"
        }
    }

    fn core() -> Arc<OrdersCore> {
        OrdersCore::new(
            OrdersConfig::default(),
            Arc::new(AbsentPeer),
            Arc::new(InMemoryOrderRepository::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_while_connector_attaches_completes() {
        let core = core();
        let attaching = Arc::clone(&core);
        let connector = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            attaching
                .attach_messaging(Arc::new(InMemoryMessagingService::new()))
                .await
                .unwrap();
        });
        *core.connect_task.lock() = Some(connector);

        let stopped = tokio::time::timeout(Duration::from_secs(3), core.shutdown()).await;
        assert!(stopped.is_ok(), "shutdown waited on a consumer it could not stop");
        assert!(core.is_shutting_down());
        assert!(!core.is_messaging_attached());
        assert!(!core.publisher().is_attached());
        assert!(core.consumer_task.lock().is_none());
    }

    #[tokio::test]
    async fn test_consumer_spawned_before_shutdown_is_stopped() {
        let core = core();
        core.attach_messaging(Arc::new(InMemoryMessagingService::new()))
            .await
            .unwrap();
        assert!(core.is_messaging_attached());

        let stopped = tokio::time::timeout(Duration::from_secs(3), core.shutdown()).await;
        assert!(stopped.is_ok());
        assert!(!core.is_messaging_attached());
    }

    #[tokio::test]
    async fn test_attach_after_shutdown_is_ignored() {
        let core = core();
        core.shutdown().await;

        let broker = Arc::new(InMemoryMessagingService::new());
        core.attach_messaging(broker.clone()).await.unwrap();

        assert!(!core.is_messaging_attached());
        assert!(!core.publisher().is_attached());
        assert!(core.health().await.consumer.is_none());
    }
}
