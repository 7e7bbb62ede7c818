//! # Orders Core
//!
//! Runs the orders core against the configured broker and peer until Ctrl-C.
//!
//! Configuration comes from `ORDERS_CONFIG_PATH` (or `config/orders.toml`),
//! `ORDERS__SECTION__KEY` variables and the legacy flat variables such as
//! `RABBITMQ_URL` and `USERS_BASE_URL`. Orders are held in memory.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use orders_core::config::OrdersConfig;
use orders_core::logging::init_structured_logging;
use orders_core::orchestration::OrdersCore;
use orders_core::persistence::InMemoryOrderRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config = OrdersConfig::load().context("loading orders configuration")?;
    let core = OrdersCore::bootstrap(config, Arc::new(InMemoryOrderRepository::new()))
        .await
        .context("bootstrapping orders core")?;

    info!(health = ?core.health().await, "Orders core running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    core.shutdown().await;
    Ok(())
}
