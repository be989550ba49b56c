//! Outbox event model.

use serde::Serialize;
use sqlx::FromRow;
use quill_core::resource::ResourceKind;
use quill_core::types::{new_id, DbId, Timestamp};

pub const EVENT_STATUS_PENDING: &str = "pending";
pub const EVENT_STATUS_COMPLETED: &str = "completed";

/// Verbs used for the second half of `event_type`.
pub mod operations {
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const DELETED: &str = "deleted";
}

/// A row from the `events` outbox table.
///
/// Written in the same transaction as the entity change it describes and
/// afterwards only touched by the dispatcher (`status`, `dispatched`,
/// `dispatched_at`).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxEvent {
    pub id: DbId,
    /// `"<entity>.<operation>"`.
    pub event_type: String,
    pub entity: String,
    pub operation: String,
    pub actor_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub status: String,
    pub dispatched: bool,
    pub dispatched_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// An outbox row about to be written.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub entity: ResourceKind,
    pub operation: &'static str,
    pub actor_id: Option<DbId>,
    pub payload: serde_json::Value,
}

impl NewEvent {
    /// Build an event from an entity payload snapshot.
    pub fn new(
        entity: ResourceKind,
        operation: &'static str,
        actor_id: Option<DbId>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            entity,
            operation,
            actor_id,
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn event_type(&self) -> String {
        format!("{}.{}", self.entity, self.operation)
    }

    /// Materialise as a fresh pending row.
    pub fn into_pending(self, created_at: Timestamp) -> OutboxEvent {
        OutboxEvent {
            id: new_id(),
            event_type: self.event_type(),
            entity: self.entity.as_str().to_string(),
            operation: self.operation.to_string(),
            actor_id: self.actor_id,
            payload: self.payload,
            status: EVENT_STATUS_PENDING.to_string(),
            dispatched: false,
            dispatched_at: None,
            created_at,
        }
    }
}
