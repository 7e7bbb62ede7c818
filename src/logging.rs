//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orders core.
//!
//! `RUST_LOG` takes precedence over the environment's default level.
//! `ORDERS_LOG_FORMAT=json` switches the console output to JSON lines.

use std::io::IsTerminal;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("ORDERS_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        // Another subscriber (e.g. a test harness) may already be installed
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("ORDERS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log the outcome of a foreign-key validation
pub fn log_validation_outcome(peer: &str, entity_id: &str, outcome: &str, reason: Option<&str>) {
    tracing::info!(
        peer = %peer,
        entity_id = %entity_id,
        outcome = %outcome,
        reason = reason,
        timestamp = %Utc::now().to_rfc3339(),
        "VALIDATION_OUTCOME"
    );
}

/// Log a lifecycle event operation; failures go out at warn level
pub fn log_event_operation(
    operation: &str,
    routing_key: &str,
    record_id: &str,
    status: &str,
    error: Option<&str>,
) {
    if error.is_some() {
        tracing::warn!(
            operation = %operation,
            routing_key = %routing_key,
            record_id = %record_id,
            status = %status,
            error = error,
            timestamp = %Utc::now().to_rfc3339(),
            "EVENT_OPERATION"
        );
    } else {
        tracing::info!(
            operation = %operation,
            routing_key = %routing_key,
            record_id = %record_id,
            status = %status,
            timestamp = %Utc::now().to_rfc3339(),
            "EVENT_OPERATION"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_per_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_event_operation("publish", "order.created", "o-1", "published", None);
        log_validation_outcome("users-service", "u1", "valid", None);
    }
}
