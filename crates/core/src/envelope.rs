//! The canonical bus message produced by the outbox dispatcher.
//!
//! ```json
//! {
//!   "event_id": "…", "timestamp": "…", "entity": "task", "type": "task.updated",
//!   "actor_id": "…", "data": { … },
//!   "note_id": "…", "notebook_id": "…", "block_id": "…", "task_id": "…", "user_id": "…"
//! }
//! ```
//!
//! The hoisted `*_id` fields are a convenience for consumers that filter
//! without decoding `data`; consumers that need exact values read `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::EventData;
use crate::resource::ResourceKind;
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: DbId,
    pub timestamp: Timestamp,
    /// Entity kind as stored on the outbox row. Kept as text so envelopes
    /// for kinds this build does not know still flow through the bus.
    pub entity: String,
    /// `"<entity>.<verb>"`, e.g. `"block.updated"`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<DbId>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,
}

/// Failure to turn an envelope's `data` into a typed payload.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("invalid {entity} payload: {source}")]
    InvalidPayload {
        entity: ResourceKind,
        #[source]
        source: serde_json::Error,
    },
}

impl EventEnvelope {
    /// Entity kind, if it is one this build knows.
    pub fn kind(&self) -> Option<ResourceKind> {
        self.entity.parse().ok()
    }

    /// The part of `type` after the first dot (`"updated"` for
    /// `"block.updated"`). Empty when the type has no dot.
    pub fn verb(&self) -> &str {
        self.event_type
            .split_once('.')
            .map(|(_, verb)| verb)
            .unwrap_or("")
    }

    /// Validate `data` against the payload schema for `entity`.
    pub fn decode(&self) -> Result<EventData, EnvelopeError> {
        let kind = self
            .kind()
            .ok_or_else(|| EnvelopeError::UnknownEntity(self.entity.clone()))?;
        EventData::from_value(kind, self.data.clone())
            .map_err(|source| EnvelopeError::InvalidPayload { entity: kind, source })
    }
}
