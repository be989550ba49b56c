//! Bidirectional block/task synchronization.
//!
//! A task-typed block and its task are two views of one item. This
//! component consumes `block.*` and `task.*` events from the bus and writes
//! the other side through the regular store write paths, so its own writes
//! come back around as events.
//!
//! Loop prevention: every write issued here carries a sync marker naming
//! the side being written to. An incoming payload that carries any marker
//! is an echo of a write made here and is dropped on sight.

mod block;
mod task;

use std::sync::Arc;

use quill_core::envelope::{EnvelopeError, EventEnvelope};
use quill_core::payload::EventData;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::types::DbId;
use quill_db::{Store, StoreError};
use quill_events::topics::{TOPIC_BLOCK, TOPIC_TASK};
use quill_events::BusMessage;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::access::{AccessError, AccessResolver};

const VERB_CREATED: &str = "created";
const VERB_UPDATED: &str = "updated";
const VERB_DELETED: &str = "deleted";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("user {actor} may not edit {} {}", .resource.kind, .resource.id)]
    Unauthorized { actor: DbId, resource: ResourceRef },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl From<EnvelopeError> for SyncError {
    fn from(err: EnvelopeError) -> Self {
        SyncError::Malformed(err.to_string())
    }
}

/// What handling one event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The payload carried a sync marker.
    Echo,
    /// Nothing to do: wrong kind, already in sync, or counterpart gone.
    Unchanged,
    /// This many writes were issued.
    Applied(usize),
}

/// Keeps task-typed blocks and tasks consistent.
pub struct BlockTaskSynchronizer {
    store: Arc<dyn Store>,
    access: Arc<AccessResolver>,
}

impl BlockTaskSynchronizer {
    pub fn new(store: Arc<dyn Store>, access: Arc<AccessResolver>) -> Self {
        Self { store, access }
    }

    /// Consume the bus until cancelled or the bus closes. Events are
    /// handled one at a time; a failed event is logged and dropped.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<BusMessage>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Block/task synchronizer started");
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = receiver.recv() => message,
            };
            match message {
                Ok(message) => {
                    if message.topic != TOPIC_BLOCK && message.topic != TOPIC_TASK {
                        continue;
                    }
                    let envelope = &message.envelope;
                    match self.handle(envelope).await {
                        Ok(outcome) => tracing::debug!(
                            event_id = %envelope.event_id,
                            event_type = %envelope.event_type,
                            ?outcome,
                            "Sync event handled",
                        ),
                        Err(e) => tracing::warn!(
                            event_id = %envelope.event_id,
                            event_type = %envelope.event_type,
                            error = %e,
                            "Sync event dropped",
                        ),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Synchronizer lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, synchronizer shutting down");
                    break;
                }
            }
        }
        tracing::info!("Block/task synchronizer stopped");
    }

    /// Apply one envelope.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<SyncOutcome, SyncError> {
        if !matches!(
            envelope.kind(),
            Some(ResourceKind::Block) | Some(ResourceKind::Task)
        ) {
            return Ok(SyncOutcome::Unchanged);
        }

        match envelope.decode()? {
            EventData::Block(payload) => {
                if payload.sync_marker().is_some() {
                    return Ok(SyncOutcome::Echo);
                }
                let actor = actor_of(envelope, payload.user_id)?;
                match envelope.verb() {
                    VERB_CREATED => self.on_block_created(actor, payload.id).await,
                    VERB_UPDATED => self.on_block_updated(actor, payload.id).await,
                    VERB_DELETED => self.on_block_deleted(actor, &payload).await,
                    _ => Ok(SyncOutcome::Unchanged),
                }
            }
            EventData::Task(payload) => {
                if payload.sync_marker().is_some() {
                    return Ok(SyncOutcome::Echo);
                }
                let actor = actor_of(envelope, payload.user_id)?;
                match envelope.verb() {
                    VERB_CREATED => self.on_task_created(actor, payload.id).await,
                    VERB_UPDATED => self.on_task_updated(actor, &payload).await,
                    VERB_DELETED => {
                        self.on_task_deleted(actor, &payload, envelope.timestamp)
                            .await
                    }
                    _ => Ok(SyncOutcome::Unchanged),
                }
            }
            _ => Ok(SyncOutcome::Unchanged),
        }
    }

    /// Fail with [`SyncError::Unauthorized`] unless `actor` can edit `resource`.
    async fn ensure_editor(&self, actor: DbId, resource: ResourceRef) -> Result<(), SyncError> {
        if self.can_edit(actor, resource).await? {
            Ok(())
        } else {
            Err(SyncError::Unauthorized { actor, resource })
        }
    }

    async fn can_edit(&self, actor: DbId, resource: ResourceRef) -> Result<bool, SyncError> {
        Ok(self
            .access
            .has_access(actor, resource.id, resource.kind, RoleLevel::Editor)
            .await?)
    }
}

/// The user a derived write is attributed to: the event's actor, or the
/// owner of the changed row for events written without one.
fn actor_of(envelope: &EventEnvelope, owner: Option<DbId>) -> Result<DbId, SyncError> {
    envelope
        .actor_id
        .or(owner)
        .ok_or_else(|| SyncError::Malformed("event names no actor or owner".into()))
}
