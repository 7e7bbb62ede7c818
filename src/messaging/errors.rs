//! # Messaging Error Types
//!
//! Structured errors for broker connection, topology, publish and consume
//! operations, using thiserror instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Comprehensive messaging error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("No broker channel established")]
    NotConnected,

    #[error("Topology declaration failed: {name}: {message}")]
    Topology { name: String, message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Receive failed on queue {queue_name}: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Ack failed on queue {queue_name} for delivery {delivery_tag}: {message}")]
    Ack {
        queue_name: String,
        delivery_tag: String,
        message: String,
    },

    #[error("Nack failed on queue {queue_name} for delivery {delivery_tag}: {message}")]
    Nack {
        queue_name: String,
        delivery_tag: String,
        message: String,
    },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Message handler failed: {message}")]
    Handler { message: String },

    #[error("Health check failed: {message}")]
    HealthCheck { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a broker connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a topology declaration error for an exchange or queue
    pub fn topology(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Topology {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    /// Create a receive error
    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Receive {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create an ack error
    pub fn ack(
        queue_name: impl Into<String>,
        delivery_tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Ack {
            queue_name: queue_name.into(),
            delivery_tag: delivery_tag.into(),
            message: message.into(),
        }
    }

    /// Create a nack error
    pub fn nack(
        queue_name: impl Into<String>,
        delivery_tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Nack {
            queue_name: queue_name.into(),
            delivery_tag: delivery_tag.into(),
            message: message.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create a health check error
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() || err.is_data() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
