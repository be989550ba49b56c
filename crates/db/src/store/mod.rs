//! Persistence seams consumed by the access engine, the synchronizer and
//! the outbox dispatcher.
//!
//! Every content write appends an outbox event describing the change in the
//! same transaction. Callers never write to the outbox directly.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use quill_core::error::CoreError;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::sync_marker::SyncSource;
use quill_core::types::{DbId, Timestamp};

use crate::models::block::{Block, CreateBlock, UpdateBlock};
use crate::models::event::OutboxEvent;
use crate::models::note::{CreateNote, Note};
use crate::models::notebook::Notebook;
use crate::models::role::RoleGrant;
use crate::models::task::{CreateTask, Task, UpdateTask};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write addressed a row that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// The database (or its stand-in) is unreachable or rejected the query.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An event payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: ResourceKind, id: DbId) -> Self {
        StoreError::NotFound {
            entity: kind.as_str(),
            id,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Role grant lookups.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// The grant `user_id` holds on exactly `resource`, if any.
    async fn find_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
    ) -> Result<Option<RoleGrant>, StoreError>;

    /// Insert or overwrite the grant for `(user_id, resource)`.
    async fn upsert_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
        role: RoleLevel,
    ) -> Result<RoleGrant, StoreError>;
}

/// Notes, notebooks, blocks and tasks.
///
/// `actor` is recorded on the outbox event of every write.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_notebook(&self, id: DbId) -> Result<Option<Notebook>, StoreError>;

    async fn find_note(&self, id: DbId) -> Result<Option<Note>, StoreError>;

    /// The user's primary note, if one is flagged.
    async fn find_primary_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError>;

    /// The user's oldest note.
    async fn find_any_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError>;

    async fn create_note(&self, actor: Option<DbId>, input: CreateNote) -> Result<Note, StoreError>;

    async fn find_block(&self, id: DbId) -> Result<Option<Block>, StoreError>;

    async fn create_block(
        &self,
        actor: Option<DbId>,
        input: CreateBlock,
    ) -> Result<Block, StoreError>;

    /// Apply `changes` to an existing block. The marker in `changes`
    /// replaces whatever marker the block carried.
    async fn update_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateBlock,
    ) -> Result<Block, StoreError>;

    /// Delete a block. The `block.deleted` payload carries `sync_source`
    /// and nothing else, whatever marker the row held.
    async fn delete_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Block, StoreError>;

    async fn find_task(&self, id: DbId) -> Result<Option<Task>, StoreError>;

    /// Tasks whose `block_id` is `block_id`.
    async fn list_tasks_by_block(&self, block_id: DbId) -> Result<Vec<Task>, StoreError>;

    async fn create_task(&self, actor: Option<DbId>, input: CreateTask)
        -> Result<Task, StoreError>;

    async fn update_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateTask,
    ) -> Result<Task, StoreError>;

    /// Delete a task. The `task.deleted` payload carries `sync_source` and
    /// nothing else, so derived deletions can be told apart from user
    /// deletions.
    async fn delete_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Task, StoreError>;
}

/// The dispatcher's view of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Every event with `dispatched = false`, in insertion order.
    async fn list_undispatched(&self) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Set `dispatched = true, status = completed, dispatched_at = at`.
    async fn mark_dispatched(&self, id: DbId, at: Timestamp) -> Result<(), StoreError>;
}

/// Everything the server wires together.
#[async_trait]
pub trait Store: RoleStore + ContentStore + OutboxStore {
    /// Cheap reachability probe for the health endpoint.
    async fn health_check(&self) -> Result<(), StoreError>;
}
