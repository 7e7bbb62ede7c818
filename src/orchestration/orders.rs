//! # Order Service
//!
//! Order creation and cancellation. Creation is gated on foreign-key
//! validation; each state change is persisted first and then announced with a
//! best-effort lifecycle event.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::{OrderStatus, RoutingKey};
use crate::error::{OrdersError, OrdersResult};
use crate::messaging::EventPublisher;
use crate::orchestration::validation::{ValidationOrchestrator, ValidationOutcome};
use crate::persistence::{NewOrder, Order, OrderRepository};

pub struct OrderService {
    validator: Arc<ValidationOrchestrator>,
    repository: Arc<dyn OrderRepository>,
    publisher: EventPublisher,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("validator", &self.validator)
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl OrderService {
    pub fn new(
        validator: Arc<ValidationOrchestrator>,
        repository: Arc<dyn OrderRepository>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            validator,
            repository,
            publisher,
        }
    }

    /// Validate the referenced entity, persist the order, announce it
    ///
    /// Fails with `InvalidReference` when the peer denies the entity and with
    /// `ServiceUnavailable` when the peer is unreachable and the entity is not
    /// cached. Nothing is persisted or published in either case.
    pub async fn create_order(&self, request: NewOrder) -> OrdersResult<Order> {
        let entity_id = request.entity_id.trim();
        if entity_id.is_empty() {
            return Err(OrdersError::invalid_input("entity_id is required"));
        }
        if !request.total.is_finite() || request.total < 0.0 {
            return Err(OrdersError::invalid_input(
                "total must be a non-negative number",
            ));
        }
        let request = NewOrder {
            entity_id: entity_id.to_string(),
            ..request
        };

        let peer = self.validator.peer_name().to_string();
        match self.validator.validate_foreign_key(&request.entity_id).await {
            ValidationOutcome::Valid => {}
            ValidationOutcome::UnavailableButCached => {
                warn!(
                    entity_id = %request.entity_id,
                    peer = %peer,
                    "Accepting order on cached entity while peer is unavailable"
                );
            }
            ValidationOutcome::Invalid => {
                return Err(OrdersError::invalid_reference(&request.entity_id, peer));
            }
            ValidationOutcome::UnavailableAndUnknown => {
                return Err(OrdersError::service_unavailable(
                    peer,
                    format!(
                        "cannot verify entity {} and it is not cached",
                        request.entity_id
                    ),
                ));
            }
        }

        let order = self.repository.create(request).await?;
        info!(order_id = %order.id, entity_id = %order.entity_id, "Order created");

        self.publisher
            .publish(RoutingKey::OrderCreated, &order.id.to_string(), &order)
            .await;
        Ok(order)
    }

    /// Cancel an order; cancelling an already-cancelled order is a no-op
    pub async fn cancel_order(&self, order_id: Uuid) -> OrdersResult<Order> {
        let existing = self
            .repository
            .find(order_id)
            .await?
            .ok_or(OrdersError::NotFound { order_id })?;

        if existing.status == OrderStatus::Cancelled {
            info!(order_id = %order_id, "Order already cancelled");
            return Ok(existing);
        }

        let order = self
            .repository
            .update_status(order_id, OrderStatus::Cancelled)
            .await?;
        info!(order_id = %order.id, "Order cancelled");

        self.publisher
            .publish(RoutingKey::OrderCancelled, &order.id.to_string(), &order)
            .await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> OrdersResult<Order> {
        self.repository
            .find(order_id)
            .await?
            .ok_or(OrdersError::NotFound { order_id })
    }

    pub async fn list_orders(&self) -> OrdersResult<Vec<Order>> {
        Ok(self.repository.list().await?)
    }
}
