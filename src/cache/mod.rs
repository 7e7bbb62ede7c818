//! # Read-Through Entity Cache
//!
//! Local copy of peer entities, fed by inbound lifecycle events and consulted
//! only when the peer cannot be reached.
//!
//! The cache is a fallback, never a source of truth: a live peer answer always
//! wins, and entries are never evicted or expired.

mod entity_handler;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use entity_handler::EntityCacheHandler;

/// Last known snapshot of a peer entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    pub id: String,
    /// Snapshot as received, `id` included
    pub attributes: serde_json::Value,
    pub last_updated: DateTime<Utc>,
}

impl CachedEntity {
    pub fn new(id: impl Into<String>, attributes: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            attributes,
            last_updated: Utc::now(),
        }
    }
}

/// Process-local map from entity id to its last known snapshot
#[derive(Debug, Default)]
pub struct ReadThroughCache {
    entries: RwLock<HashMap<String, CachedEntity>>,
}

impl ReadThroughCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; the latest write wins
    pub fn put(&self, id: impl Into<String>, entity: CachedEntity) -> Option<CachedEntity> {
        self.entries.write().insert(id.into(), entity)
    }

    pub fn get(&self, id: &str) -> Option<CachedEntity> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
