//! # Lifecycle Messages
//!
//! Outbound lifecycle events and inbound deliveries exchanged with the broker.

use serde::Serialize;
use std::fmt;

use crate::constants::RoutingKey;
use crate::messaging::{MessagingError, MessagingResult};

/// Event published to the topic exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub routing_key: String,
    /// Serialized entity snapshot
    pub payload: Vec<u8>,
    /// Survives a broker restart once enqueued
    pub persistent: bool,
}

impl LifecycleEvent {
    /// Build a persistent event carrying a JSON snapshot of `record`
    pub fn from_snapshot<T: Serialize>(routing_key: RoutingKey, record: &T) -> MessagingResult<Self> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;
        Ok(Self {
            routing_key: routing_key.as_str().to_string(),
            payload,
            persistent: true,
        })
    }

    /// Build a persistent event from an already-serialized body
    pub fn raw(routing_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload: payload.into(),
            persistent: true,
        }
    }
}

/// Provider-specific handle used to ack or nack a delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ReceiptHandle {
    fn from(delivery_tag: u64) -> Self {
        Self(delivery_tag.to_string())
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message delivered to a consumer, awaiting ack or nack
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    pub receipt: ReceiptHandle,
}

impl InboundMessage {
    /// Parse the payload as JSON
    pub fn json(&self) -> MessagingResult<serde_json::Value> {
        serde_json::from_slice(&self.payload).map_err(MessagingError::from)
    }
}
