use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{CachedEntity, ReadThroughCache};
use crate::messaging::{EventHandler, InboundMessage, MessagingError, MessagingResult};

/// Upserts entity snapshots from created/updated events into the cache
///
/// Deliveries under any other routing key are accepted untouched. A payload
/// that is not a JSON object with a string or numeric `id` is rejected.
#[derive(Debug)]
pub struct EntityCacheHandler {
    cache: Arc<ReadThroughCache>,
    routing_keys: HashSet<String>,
}

impl EntityCacheHandler {
    pub fn new(cache: Arc<ReadThroughCache>, routing_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            cache,
            routing_keys: routing_keys.into_iter().collect(),
        }
    }

    fn entity_id(snapshot: &Value) -> MessagingResult<String> {
        match snapshot.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            Some(other) => Err(MessagingError::message_deserialization(format!(
                "entity id must be a non-empty string or number, got {other}"
            ))),
            None => Err(MessagingError::message_deserialization(
                "entity snapshot has no id",
            )),
        }
    }
}

#[async_trait]
impl EventHandler for EntityCacheHandler {
    async fn handle(&self, message: &InboundMessage) -> MessagingResult<()> {
        if !self.routing_keys.contains(&message.routing_key) {
            debug!(routing_key = %message.routing_key, "Ignoring unhandled routing key");
            return Ok(());
        }

        let snapshot = message.json()?;
        if !snapshot.is_object() {
            return Err(MessagingError::message_deserialization(
                "entity snapshot must be a JSON object",
            ));
        }
        let id = Self::entity_id(&snapshot)?;

        let replaced = self
            .cache
            .put(id.clone(), CachedEntity::new(id.clone(), snapshot))
            .is_some();
        debug!(entity_id = %id, replaced = replaced, routing_key = %message.routing_key, "Entity cached");
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "entity_cache"
    }
}
