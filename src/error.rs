//! Error types for the orders core.
//!

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::persistence::PersistenceError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrdersError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid reference: entity {entity_id} was rejected by {service}")]
    InvalidReference { entity_id: String, service: String },
    #[error("Service unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },
    #[error("Order not found: {order_id}")]
    NotFound { order_id: Uuid },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl OrdersError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_reference(entity_id: impl Into<String>, service: impl Into<String>) -> Self {
        Self::InvalidReference {
            entity_id: entity_id.into(),
            service: service.into(),
        }
    }

    pub fn service_unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status an outer route handler should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::InvalidReference { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::ServiceUnavailable { .. } => 503,
            Self::Persistence(_) | Self::Messaging(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<PersistenceError> for OrdersError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { order_id } => Self::NotFound { order_id },
            PersistenceError::Conflict { message } => Self::Conflict(message),
            PersistenceError::Storage { message } => Self::Persistence(message),
        }
    }
}

pub type OrdersResult<T> = std::result::Result<T, OrdersError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_taxonomy() {
        assert_eq!(OrdersError::invalid_reference("u-1", "users").status_code(), 400);
        assert_eq!(
            OrdersError::service_unavailable("users", "circuit open").status_code(),
            503
        );
        assert_eq!(
            OrdersError::NotFound {
                order_id: Uuid::new_v4()
            }
            .status_code(),
            404
        );
    }

    #[test]
    fn test_persistence_conversion() {
        let id = Uuid::new_v4();
        let err: OrdersError = PersistenceError::NotFound { order_id: id }.into();
        assert!(matches!(err, OrdersError::NotFound { order_id } if order_id == id));

        let err: OrdersError = PersistenceError::conflict("duplicate").into();
        assert!(matches!(err, OrdersError::Conflict(_)));
    }

    #[test]
    fn test_error_display() {
        let err = OrdersError::service_unavailable("users", "entity not cached");
        let display = format!("{err}");
        assert!(display.contains("Service unavailable"));
        assert!(display.contains("entity not cached"));
    }
}
