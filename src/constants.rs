//! # System Constants
//!
//! Routing vocabulary and record statuses shared by the publisher, the
//! consume loop and the order service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of lifecycle routing keys exchanged over the topic exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingKey {
    #[serde(rename = "entity.created")]
    EntityCreated,
    #[serde(rename = "entity.updated")]
    EntityUpdated,
    #[serde(rename = "entity.deleted")]
    EntityDeleted,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
}

impl RoutingKey {
    pub const ALL: [RoutingKey; 5] = [
        RoutingKey::EntityCreated,
        RoutingKey::EntityUpdated,
        RoutingKey::EntityDeleted,
        RoutingKey::OrderCreated,
        RoutingKey::OrderCancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKey::EntityCreated => "entity.created",
            RoutingKey::EntityUpdated => "entity.updated",
            RoutingKey::EntityDeleted => "entity.deleted",
            RoutingKey::OrderCreated => "order.created",
            RoutingKey::OrderCancelled => "order.cancelled",
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown routing key: {s}"))
    }
}

/// Order status values written by the persistence collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
