//! # Orders Orchestration
//!
//! Order workflows on top of the resilience, cache and messaging layers.
//!
//! ## Core Components
//!
//! - **ValidationOrchestrator**: breaker-wrapped, retried peer lookup with cache fallback
//! - **OrderService**: create/cancel/list with best-effort lifecycle publication
//! - **OrdersCore**: assembly, background broker attachment, health and shutdown

pub mod bootstrap;
pub mod orders;
pub mod validation;

pub use bootstrap::{HealthReport, HealthStatus, OrdersCore};
pub use orders::OrderService;
pub use validation::{ValidationOrchestrator, ValidationOutcome};
