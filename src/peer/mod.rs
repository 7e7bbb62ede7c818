//! # Peer Directory
//!
//! Lookup-by-id against the peer service that owns the referenced entities.
//!
//! A lookup answers in three authoritative ways ([`PeerLookup`]) or fails
//! with a transient [`PeerError`]. Only transient errors are retried, count
//! against the circuit breaker, and fall back to the cache.
//!
//! | Peer response              | Result                         |
//! |----------------------------|--------------------------------|
//! | 2xx                        | `Ok(Found(body))`              |
//! | 404                        | `Ok(NotFound)`                 |
//! | other 4xx except 408, 429  | `Ok(Rejected { status })`      |
//! | 408, 429, 5xx              | `Err(Unavailable { status })`  |
//! | timeout, connect failure   | `Err(Timeout / Network)`       |

mod http_client;

use async_trait::async_trait;
use thiserror::Error;

pub use http_client::HttpPeerClient;

/// Authoritative answer from the peer
#[derive(Debug, Clone, PartialEq)]
pub enum PeerLookup {
    /// The entity exists; carries the peer's representation
    Found(serde_json::Value),
    NotFound,
    /// The peer refused the request; the reference cannot be confirmed
    Rejected { status: u16 },
}

impl PeerLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Transient lookup failure
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("peer unreachable: {message}")]
    Network { message: String },

    #[error("peer answered with transient status {status}")]
    Unavailable { status: u16 },

    #[error("unexpected peer response: {message}")]
    InvalidResponse { message: String },
}

/// Looks up entities by id in the peer service
#[async_trait]
pub trait PeerDirectory: Send + Sync + 'static {
    async fn lookup(&self, entity_id: &str) -> Result<PeerLookup, PeerError>;

    /// Peer name for logs and error messages
    fn peer_name(&self) -> &str;
}
