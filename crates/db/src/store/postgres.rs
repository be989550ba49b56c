//! Postgres-backed store.

use async_trait::async_trait;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::sync_marker::SyncSource;
use quill_core::types::{DbId, Timestamp};
use sqlx::PgConnection;

use super::{ContentStore, OutboxStore, RoleStore, Store, StoreError};
use crate::models::block::{Block, CreateBlock, UpdateBlock};
use crate::models::event::{operations, NewEvent, OutboxEvent};
use crate::models::note::{CreateNote, Note};
use crate::models::notebook::Notebook;
use crate::models::role::RoleGrant;
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::repositories::{BlockRepo, EventRepo, NoteRepo, NotebookRepo, RoleRepo, TaskRepo};
use crate::DbPool;

/// [`Store`](super::Store) over a Postgres pool.
///
/// Each write runs in its own transaction: lock the row, apply the change
/// in Rust, save, append the outbox event, commit.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

async fn append_event(
    conn: &mut PgConnection,
    kind: ResourceKind,
    operation: &'static str,
    actor: Option<DbId>,
    payload: &impl serde::Serialize,
) -> Result<(), StoreError> {
    let event = NewEvent::new(kind, operation, actor, payload)?;
    EventRepo::insert(conn, &event).await?;
    Ok(())
}

#[async_trait]
impl RoleStore for PgStore {
    async fn find_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
    ) -> Result<Option<RoleGrant>, StoreError> {
        Ok(RoleRepo::find(&self.pool, user_id, resource).await?)
    }

    async fn upsert_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
        role: RoleLevel,
    ) -> Result<RoleGrant, StoreError> {
        Ok(RoleRepo::upsert(&self.pool, user_id, resource, role).await?)
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_notebook(&self, id: DbId) -> Result<Option<Notebook>, StoreError> {
        Ok(NotebookRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_note(&self, id: DbId) -> Result<Option<Note>, StoreError> {
        Ok(NoteRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_primary_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError> {
        Ok(NoteRepo::find_primary(&self.pool, user_id).await?)
    }

    async fn find_any_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError> {
        Ok(NoteRepo::find_oldest(&self.pool, user_id).await?)
    }

    async fn create_note(&self, actor: Option<DbId>, input: CreateNote) -> Result<Note, StoreError> {
        let mut tx = self.pool.begin().await?;
        let note = NoteRepo::insert(&mut *tx, &input).await?;
        append_event(
            &mut tx,
            ResourceKind::Note,
            operations::CREATED,
            actor,
            &note.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(note)
    }

    async fn find_block(&self, id: DbId) -> Result<Option<Block>, StoreError> {
        Ok(BlockRepo::find_by_id(&self.pool, id).await?)
    }

    async fn create_block(
        &self,
        actor: Option<DbId>,
        input: CreateBlock,
    ) -> Result<Block, StoreError> {
        let mut tx = self.pool.begin().await?;
        let block = BlockRepo::insert(&mut *tx, &input).await?;
        append_event(
            &mut tx,
            ResourceKind::Block,
            operations::CREATED,
            actor,
            &block.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(block)
    }

    async fn update_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateBlock,
    ) -> Result<Block, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut block = BlockRepo::find_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found(ResourceKind::Block, id))?;
        block.apply(&changes);
        let block = BlockRepo::save(&mut *tx, &block).await?;
        append_event(
            &mut tx,
            ResourceKind::Block,
            operations::UPDATED,
            actor,
            &block.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(block)
    }

    async fn delete_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Block, StoreError> {
        let mut tx = self.pool.begin().await?;
        let block = BlockRepo::delete(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found(ResourceKind::Block, id))?;
        append_event(
            &mut tx,
            ResourceKind::Block,
            operations::DELETED,
            actor,
            &block.deletion_payload(sync_source),
        )
        .await?;
        tx.commit().await?;
        Ok(block)
    }

    async fn find_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_tasks_by_block(&self, block_id: DbId) -> Result<Vec<Task>, StoreError> {
        Ok(TaskRepo::list_by_block(&self.pool, block_id).await?)
    }

    async fn create_task(
        &self,
        actor: Option<DbId>,
        input: CreateTask,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::insert(&mut *tx, &input).await?;
        append_event(
            &mut tx,
            ResourceKind::Task,
            operations::CREATED,
            actor,
            &task.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn update_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateTask,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut task = TaskRepo::find_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found(ResourceKind::Task, id))?;
        task.apply(&changes);
        let task = TaskRepo::save(&mut *tx, &task).await?;
        append_event(
            &mut tx,
            ResourceKind::Task,
            operations::UPDATED,
            actor,
            &task.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn delete_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::delete(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found(ResourceKind::Task, id))?;
        append_event(
            &mut tx,
            ResourceKind::Task,
            operations::DELETED,
            actor,
            &task.deletion_payload(sync_source),
        )
        .await?;
        tx.commit().await?;
        Ok(task)
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn list_undispatched(&self) -> Result<Vec<OutboxEvent>, StoreError> {
        Ok(EventRepo::list_undispatched(&self.pool).await?)
    }

    async fn mark_dispatched(&self, id: DbId, at: Timestamp) -> Result<(), StoreError> {
        if !EventRepo::mark_dispatched(&self.pool, id, at).await? {
            tracing::warn!(event_id = %id, "Outbox row vanished before it was marked dispatched");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
