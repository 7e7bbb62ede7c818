//! # Foreign-Key Validation
//!
//! Decides whether an order may reference a peer entity.
//!
//! The peer lookup runs inside the retry executor, and the whole retried
//! sequence runs as one circuit-breaker call. An authoritative peer answer
//! always wins over the cache; the cache is consulted only when the peer
//! could not give one (breaker open, timeout, or retries exhausted).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::ReadThroughCache;
use crate::config::{ConfigResult, OrdersConfig};
use crate::logging::log_validation_outcome;
use crate::peer::{PeerDirectory, PeerLookup};
use crate::resilience::{CircuitBreaker, RetryExecutor};

/// Result of validating one foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The peer confirmed the entity exists
    Valid,
    /// The peer answered authoritatively that it cannot be confirmed
    Invalid,
    /// Peer unreachable, but the entity was seen in a lifecycle event
    UnavailableButCached,
    /// Peer unreachable and the entity is unknown locally
    UnavailableAndUnknown,
}

impl ValidationOutcome {
    /// Whether the order may proceed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Valid | Self::UnavailableButCached)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::UnavailableButCached => "unavailable_but_cached",
            Self::UnavailableAndUnknown => "unavailable_and_unknown",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ValidationOrchestrator {
    peer: Arc<dyn PeerDirectory>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    cache: Arc<ReadThroughCache>,
}

impl fmt::Debug for ValidationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOrchestrator")
            .field("peer", &self.peer.peer_name())
            .field("breaker_state", &self.breaker.state())
            .field("retry", self.retry.policy())
            .field("cached_entities", &self.cache.len())
            .finish()
    }
}

impl ValidationOrchestrator {
    pub fn new(
        peer: Arc<dyn PeerDirectory>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryExecutor,
        cache: Arc<ReadThroughCache>,
    ) -> Self {
        Self {
            peer,
            breaker,
            retry,
            cache,
        }
    }

    /// Build the breaker and retry executor from configuration
    pub fn from_config(
        config: &OrdersConfig,
        peer: Arc<dyn PeerDirectory>,
        cache: Arc<ReadThroughCache>,
    ) -> ConfigResult<Self> {
        let breaker = Arc::new(CircuitBreaker::new(
            peer.peer_name().to_string(),
            config.circuit_breaker.breaker_config()?,
        ));
        let retry = RetryExecutor::new(
            format!("{}_lookup", peer.peer_name()),
            config.retry.policy()?,
        );
        Ok(Self::new(peer, breaker, retry, cache))
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &Arc<ReadThroughCache> {
        &self.cache
    }

    pub fn peer_name(&self) -> &str {
        self.peer.peer_name()
    }

    /// Validate that `entity_id` exists in the peer service
    pub async fn validate_foreign_key(&self, entity_id: &str) -> ValidationOutcome {
        let peer = &self.peer;
        let result = self
            .breaker
            .call(|| self.retry.execute(|| peer.lookup(entity_id)))
            .await;

        let (outcome, reason) = match result {
            Ok(PeerLookup::Found(_)) => (ValidationOutcome::Valid, None),
            Ok(PeerLookup::NotFound) => (ValidationOutcome::Invalid, Some("not found".to_string())),
            Ok(PeerLookup::Rejected { status }) => (
                ValidationOutcome::Invalid,
                Some(format!("rejected with status {status}")),
            ),
            Err(err) => {
                let outcome = if self.cache.contains(entity_id) {
                    ValidationOutcome::UnavailableButCached
                } else {
                    ValidationOutcome::UnavailableAndUnknown
                };
                (outcome, Some(err.to_string()))
            }
        };

        log_validation_outcome(
            self.peer.peer_name(),
            entity_id,
            outcome.as_str(),
            reason.as_deref(),
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedEntity;
    use crate::peer::PeerError;
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RetryPolicy};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Answers from a script, then repeats the last entry
    struct ScriptedPeer {
        script: Mutex<VecDeque<Result<PeerLookup, u16>>>,
        calls: AtomicU32,
    }

    impl ScriptedPeer {
        fn new(script: Vec<Result<PeerLookup, u16>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PeerDirectory for ScriptedPeer {
        async fn lookup(&self, _entity_id: &str) -> Result<PeerLookup, PeerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            match next {
                Some(Ok(lookup)) => Ok(lookup),
                Some(Err(status)) => Err(PeerError::Unavailable { status }),
                None => Err(PeerError::Network {
                    message: "empty script".to_string(),
                }),
            }
        }

        fn peer_name(&self) -> &str {
            "users-service"
        }
    }

    fn orchestrator(peer: Arc<ScriptedPeer>) -> ValidationOrchestrator {
        let breaker = Arc::new(CircuitBreaker::new(
            "users-service",
            CircuitBreakerConfig {
                call_timeout: Duration::from_secs(10),
                ..CircuitBreakerConfig::default()
            },
        ));
        let retry = RetryExecutor::new(
            "users_lookup",
            RetryPolicy::new(3, Duration::from_millis(400)).unwrap(),
        );
        ValidationOrchestrator::new(peer, breaker, retry, Arc::new(ReadThroughCache::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_is_valid_first_try() {
        let peer = ScriptedPeer::new(vec![Ok(PeerLookup::Found(serde_json::json!({"id": "u1"})))]);
        let validator = orchestrator(peer.clone());

        assert_eq!(validator.validate_foreign_key("u1").await, ValidationOutcome::Valid);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_invalid_without_retry_or_cache() {
        let peer = ScriptedPeer::new(vec![Ok(PeerLookup::NotFound)]);
        let validator = orchestrator(peer.clone());
        validator
            .cache()
            .put("u1", CachedEntity::new("u1", serde_json::json!({"id": "u1"})));

        assert_eq!(validator.validate_foreign_key("u1").await, ValidationOutcome::Invalid);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(validator.breaker().metrics().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let peer = ScriptedPeer::new(vec![
            Err(503),
            Err(502),
            Ok(PeerLookup::Found(serde_json::Value::Null)),
        ]);
        let validator = orchestrator(peer.clone());

        assert_eq!(validator.validate_foreign_key("u1").await, ValidationOutcome::Valid);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(validator.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back_to_cache() {
        let peer = ScriptedPeer::new(vec![Err(503)]);
        let validator = orchestrator(peer.clone());
        validator
            .cache()
            .put("cached", CachedEntity::new("cached", serde_json::json!({"id": "cached"})));

        assert_eq!(
            validator.validate_foreign_key("cached").await,
            ValidationOutcome::UnavailableButCached
        );
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);

        // The failed sequence opened the breaker; this call is rejected without a lookup
        assert_eq!(
            validator.validate_foreign_key("stranger").await,
            ValidationOutcome::UnavailableAndUnknown
        );
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_outcome_acceptance() {
        assert!(ValidationOutcome::Valid.is_accepted());
        assert!(ValidationOutcome::UnavailableButCached.is_accepted());
        assert!(!ValidationOutcome::Invalid.is_accepted());
        assert!(!ValidationOutcome::UnavailableAndUnknown.is_accepted());
    }
}
