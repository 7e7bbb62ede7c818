//! Shared harness: an `OrdersCore` wired to a wiremock peer and the
//! in-memory broker, plus an audit queue bound to every order event.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orders_core::config::OrdersConfig;
use orders_core::messaging::{InMemoryMessagingService, LifecycleEvent, MessagingService};
use orders_core::orchestration::OrdersCore;
use orders_core::peer::HttpPeerClient;
use orders_core::persistence::{InMemoryOrderRepository, NewOrder};

pub const AUDIT_QUEUE: &str = "audit.q";

pub struct TestCore {
    pub core: Arc<OrdersCore>,
    pub broker: Arc<InMemoryMessagingService>,
    pub repository: Arc<InMemoryOrderRepository>,
}

/// Fast timings: 200ms peer timeout, 3 attempts 10ms apart, 2s breaker timeout
pub fn test_config(peer_base_url: &str) -> OrdersConfig {
    let mut config = OrdersConfig::default();
    config.peer.base_url = peer_base_url.to_string();
    config.peer.request_timeout_ms = 200;
    config.retry.base_delay_ms = 10;
    config.circuit_breaker.call_timeout_ms = 2_000;
    config
}

pub async fn start_core(config: OrdersConfig) -> TestCore {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let peer = Arc::new(HttpPeerClient::new(&config.peer).expect("peer client"));
    let repository = Arc::new(InMemoryOrderRepository::new());
    let exchange = config.broker.exchange.clone();
    let core = OrdersCore::new(config, peer, repository.clone()).expect("core assembles");

    let broker = Arc::new(InMemoryMessagingService::new());
    core.attach_messaging(broker.clone())
        .await
        .expect("messaging attaches");
    broker
        .ensure_queue(AUDIT_QUEUE, &exchange, &["order.#".to_string()])
        .await
        .expect("audit queue");

    TestCore {
        core,
        broker,
        repository,
    }
}

impl TestCore {
    /// Publish a peer lifecycle event as the peer service would
    pub async fn peer_event(&self, routing_key: &str, payload: &[u8]) {
        let exchange = &self.core.config().broker.exchange;
        self.broker
            .publish(exchange, &LifecycleEvent::raw(routing_key, payload.to_vec()))
            .await
            .expect("peer event published");
    }
}

pub fn order_for(entity_id: &str) -> NewOrder {
    NewOrder {
        entity_id: entity_id.to_string(),
        items: vec![serde_json::json!({"sku": "SKU-1", "quantity": 1})],
        total: 25.0,
    }
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
