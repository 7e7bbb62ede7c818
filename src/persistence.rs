//! # Order Persistence
//!
//! Storage boundary for orders. The durable store lives outside this crate;
//! [`InMemoryOrderRepository`] backs tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::OrderStatus;

/// Persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Peer entity this order references
    pub entity_id: String,
    pub items: Vec<serde_json::Value>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order fields supplied on creation; the repository assigns id and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub entity_id: String,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    pub total: f64,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("order {order_id} not found")]
    NotFound { order_id: Uuid },

    #[error("write conflict: {message}")]
    Conflict { message: String },

    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl PersistenceError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Persist a new order with status `created`
    async fn create(&self, order: NewOrder) -> Result<Order, PersistenceError>;

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>, PersistenceError>;

    /// Set the status and bump `updated_at`
    async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, PersistenceError>;

    /// All orders, oldest first
    async fn list(&self) -> Result<Vec<Order>, PersistenceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<Order, PersistenceError> {
        let now = Utc::now();
        let record = Order {
            id: Uuid::new_v4(),
            entity_id: order.entity_id,
            items: order.items,
            total: order.total,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        };

        let mut orders = self.orders.write();
        if orders.contains_key(&record.id) {
            return Err(PersistenceError::conflict(format!(
                "order {} already exists",
                record.id
            )));
        }
        orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>, PersistenceError> {
        Ok(self.orders.read().get(&order_id).cloned())
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, PersistenceError> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(&order_id)
            .ok_or(PersistenceError::NotFound { order_id })?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn list(&self) -> Result<Vec<Order>, PersistenceError> {
        let mut orders: Vec<Order> = self.orders.read().values().cloned().collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(entity_id: &str) -> NewOrder {
        NewOrder {
            entity_id: entity_id.to_string(),
            items: vec![json!({"sku": "A-1", "qty": 2})],
            total: 19.5,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.create(draft("u1")).await.unwrap();

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(repo.find(order.id).await.unwrap(), Some(order));
        assert!(repo.find(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.create(draft("u1")).await.unwrap();

        let cancelled = repo.update_status(order.id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.updated_at >= order.updated_at);

        let missing = repo.update_status(Uuid::new_v4(), OrderStatus::Cancelled).await;
        assert!(matches!(missing, Err(PersistenceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_returns_all_orders() {
        let repo = InMemoryOrderRepository::new();
        repo.create(draft("u1")).await.unwrap();
        repo.create(draft("u2")).await.unwrap();

        let orders = repo.list().await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].created_at <= orders[1].created_at);
    }
}
