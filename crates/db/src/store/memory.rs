//! In-memory store for tests.
//!
//! Same observable semantics as [`PgStore`](super::PgStore): every write
//! appends a pending outbox event, and marker handling is identical because
//! both go through the model `apply` helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::sync_marker::SyncSource;
use quill_core::types::{new_id, DbId, Timestamp};
use tokio::sync::RwLock;

use super::{ContentStore, OutboxStore, RoleStore, Store, StoreError};
use crate::models::block::{Block, CreateBlock, UpdateBlock};
use crate::models::event::{operations, NewEvent, OutboxEvent, EVENT_STATUS_COMPLETED};
use crate::models::note::{CreateNote, Note};
use crate::models::notebook::Notebook;
use crate::models::role::RoleGrant;
use crate::models::task::{CreateTask, Task, UpdateTask};

#[derive(Default)]
struct State {
    notebooks: HashMap<DbId, Notebook>,
    notes: HashMap<DbId, Note>,
    blocks: HashMap<DbId, Block>,
    tasks: HashMap<DbId, Task>,
    roles: Vec<RoleGrant>,
    events: Vec<OutboxEvent>,
}

impl State {
    fn append(
        &mut self,
        kind: ResourceKind,
        operation: &'static str,
        actor: Option<DbId>,
        payload: &impl serde::Serialize,
    ) -> Result<(), StoreError> {
        let event = NewEvent::new(kind, operation, actor, payload)?;
        self.events.push(event.into_pending(Utc::now()));
        Ok(())
    }
}

/// Counters of the writes a store has accepted, per entity.
#[derive(Debug, Default)]
struct WriteCounters {
    block: AtomicUsize,
    task: AtomicUsize,
}

/// In-memory [`Store`](super::Store).
///
/// `set_unavailable(true)` makes every call fail with a database error,
/// which is how tests exercise the transient-infra paths.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    writes: WriteCounters,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Insert a notebook directly. Notebook writes are not part of the
    /// content seam, so no event is recorded.
    pub async fn add_notebook(&self, user_id: DbId, name: &str) -> Notebook {
        let now = Utc::now();
        let notebook = Notebook {
            id: new_id(),
            user_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .notebooks
            .insert(notebook.id, notebook.clone());
        notebook
    }

    /// Snapshot of the outbox, in insertion order.
    pub async fn outbox(&self) -> Vec<OutboxEvent> {
        self.state.read().await.events.clone()
    }

    /// Number of successful block writes (create, update, delete).
    pub fn block_writes(&self) -> usize {
        self.writes.block.load(Ordering::SeqCst)
    }

    /// Number of successful task writes (create, update, delete).
    pub fn task_writes(&self) -> usize {
        self.writes.task.load(Ordering::SeqCst)
    }

    pub async fn blocks_in_note(&self, note_id: DbId) -> Vec<Block> {
        let state = self.state.read().await;
        let mut blocks: Vec<Block> = state
            .blocks
            .values()
            .filter(|b| b.note_id == note_id)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| a.order.total_cmp(&b.order));
        blocks
    }

    pub async fn notes_of(&self, user_id: DbId) -> Vec<Note> {
        let state = self.state.read().await;
        let mut notes: Vec<Note> = state
            .notes
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notes.sort_by_key(|n| (n.created_at, n.id));
        notes
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
    ) -> Result<Option<RoleGrant>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .roles
            .iter()
            .find(|g| g.user_id == user_id && g.resource() == resource)
            .cloned())
    }

    async fn upsert_grant(
        &self,
        user_id: DbId,
        resource: ResourceRef,
        role: RoleLevel,
    ) -> Result<RoleGrant, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        if let Some(existing) = state
            .roles
            .iter_mut()
            .find(|g| g.user_id == user_id && g.resource() == resource)
        {
            existing.role = role;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let grant = RoleGrant {
            id: new_id(),
            user_id,
            resource_id: resource.id,
            resource_type: resource.kind,
            role,
            created_at: now,
            updated_at: now,
        };
        state.roles.push(grant.clone());
        Ok(grant)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_notebook(&self, id: DbId) -> Result<Option<Notebook>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.notebooks.get(&id).cloned())
    }

    async fn find_note(&self, id: DbId) -> Result<Option<Note>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.notes.get(&id).cloned())
    }

    async fn find_primary_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .notes
            .values()
            .find(|n| n.user_id == user_id && n.is_primary)
            .cloned())
    }

    async fn find_any_note(&self, user_id: DbId) -> Result<Option<Note>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .notes
            .values()
            .filter(|n| n.user_id == user_id)
            .min_by_key(|n| (n.created_at, n.id))
            .cloned())
    }

    async fn create_note(&self, actor: Option<DbId>, input: CreateNote) -> Result<Note, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let note = Note {
            id: new_id(),
            user_id: input.user_id,
            notebook_id: input.notebook_id,
            title: input.title,
            is_primary: input.is_primary,
            created_at: now,
            updated_at: now,
        };
        state.append(
            ResourceKind::Note,
            operations::CREATED,
            actor,
            &note.to_payload(),
        )?;
        state.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn find_block(&self, id: DbId) -> Result<Option<Block>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.blocks.get(&id).cloned())
    }

    async fn create_block(
        &self,
        actor: Option<DbId>,
        input: CreateBlock,
    ) -> Result<Block, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let order = input.order.unwrap_or_else(|| {
            state
                .blocks
                .values()
                .filter(|b| b.note_id == input.note_id)
                .map(|b| b.order)
                .fold(0.0, f64::max)
                + 1.0
        });
        let mut metadata = input.metadata;
        metadata.sync_source = input.sync_source;
        let now = Utc::now();
        let block = Block {
            id: new_id(),
            note_id: input.note_id,
            user_id: input.user_id,
            block_type: input.block_type,
            content: input.content,
            metadata,
            order,
            created_at: now,
            updated_at: now,
        };
        state.append(
            ResourceKind::Block,
            operations::CREATED,
            actor,
            &block.to_payload(),
        )?;
        state.blocks.insert(block.id, block.clone());
        self.writes.block.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    async fn update_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateBlock,
    ) -> Result<Block, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let mut block = state
            .blocks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ResourceKind::Block, id))?;
        block.apply(&changes);
        block.updated_at = Utc::now();
        state.append(
            ResourceKind::Block,
            operations::UPDATED,
            actor,
            &block.to_payload(),
        )?;
        state.blocks.insert(id, block.clone());
        self.writes.block.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    async fn delete_block(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Block, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let block = state
            .blocks
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(ResourceKind::Block, id))?;
        state.append(
            ResourceKind::Block,
            operations::DELETED,
            actor,
            &block.deletion_payload(sync_source),
        )?;
        self.writes.block.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    async fn find_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn list_tasks_by_block(&self, block_id: DbId) -> Result<Vec<Task>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.block_id == Some(block_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn create_task(
        &self,
        actor: Option<DbId>,
        input: CreateTask,
    ) -> Result<Task, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let mut metadata = input.metadata;
        metadata.sync_source = input.sync_source;
        let now = Utc::now();
        let task = Task {
            id: new_id(),
            user_id: input.user_id,
            title: input.title,
            description: input.description,
            is_completed: input.is_completed,
            block_id: input.block_id,
            metadata,
            created_at: now,
            updated_at: now,
        };
        state.append(
            ResourceKind::Task,
            operations::CREATED,
            actor,
            &task.to_payload(),
        )?;
        state.tasks.insert(task.id, task.clone());
        self.writes.task.fetch_add(1, Ordering::SeqCst);
        Ok(task)
    }

    async fn update_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        changes: UpdateTask,
    ) -> Result<Task, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let mut task = state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ResourceKind::Task, id))?;
        task.apply(&changes);
        task.updated_at = Utc::now();
        state.append(
            ResourceKind::Task,
            operations::UPDATED,
            actor,
            &task.to_payload(),
        )?;
        state.tasks.insert(id, task.clone());
        self.writes.task.fetch_add(1, Ordering::SeqCst);
        Ok(task)
    }

    async fn delete_task(
        &self,
        actor: Option<DbId>,
        id: DbId,
        sync_source: Option<SyncSource>,
    ) -> Result<Task, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(ResourceKind::Task, id))?;
        state.append(
            ResourceKind::Task,
            operations::DELETED,
            actor,
            &task.deletion_payload(sync_source),
        )?;
        self.writes.task.fetch_add(1, Ordering::SeqCst);
        Ok(task)
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn list_undispatched(&self) -> Result<Vec<OutboxEvent>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.events.iter().filter(|e| !e.dispatched).cloned().collect())
    }

    async fn mark_dispatched(&self, id: DbId, at: Timestamp) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        if let Some(event) = state.events.iter_mut().find(|e| e.id == id) {
            event.dispatched = true;
            event.status = EVENT_STATUS_COMPLETED.to_string();
            event.dispatched_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.check()
    }
}
