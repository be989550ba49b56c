//! Block-side transitions: keep the task(s) of a block in line with it.
//!
//! Block handlers read the block's current state instead of trusting the
//! event snapshot, which makes them safe to replay and order-insensitive.

use quill_core::payload::{BlockPayload, TaskMetadata};
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::sync_marker::SyncSource;
use quill_core::types::DbId;
use quill_db::models::block::{Block, UpdateBlock};
use quill_db::models::task::{CreateTask, UpdateTask};

use super::{BlockTaskSynchronizer, SyncError, SyncOutcome};

impl BlockTaskSynchronizer {
    /// A task-typed block without a task gets one.
    pub(super) async fn on_block_created(
        &self,
        actor: DbId,
        block_id: DbId,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(block) = self.store.find_block(block_id).await? else {
            return Ok(SyncOutcome::Unchanged);
        };
        if !block.block_type.is_task() {
            return Ok(SyncOutcome::Unchanged);
        }
        if !self.store.list_tasks_by_block(block.id).await?.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        self.create_task_for(actor, &block).await
    }

    /// Task-typed: align the linked task(s), creating one if missing, as a
    /// create would.
    /// Any other type: the block no longer represents a task, so tasks
    /// still pointing at it are removed.
    pub(super) async fn on_block_updated(
        &self,
        actor: DbId,
        block_id: DbId,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(block) = self.store.find_block(block_id).await? else {
            return Ok(SyncOutcome::Unchanged);
        };
        let tasks = self.store.list_tasks_by_block(block.id).await?;

        if !block.block_type.is_task() {
            if tasks.is_empty() {
                return Ok(SyncOutcome::Unchanged);
            }
            self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
                .await?;
            return self.delete_tasks(actor, tasks.iter().map(|t| t.id)).await;
        }

        // No task yet: same as a create. The new link clears any tombstone.
        if tasks.is_empty() {
            return self.create_task_for(actor, &block).await;
        }

        let mut writes = 0;
        for task in tasks {
            let changes = UpdateTask {
                title: block
                    .content
                    .text
                    .as_ref()
                    .filter(|text| **text != task.title)
                    .cloned(),
                is_completed: block
                    .metadata
                    .is_completed
                    .filter(|done| *done != task.is_completed),
                ..Default::default()
            };
            if changes.title.is_none() && changes.is_completed.is_none() {
                continue;
            }
            if writes == 0 {
                self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
                    .await?;
            }
            self.store
                .update_task(
                    Some(actor),
                    task.id,
                    UpdateTask {
                        sync_source: Some(SyncSource::Task),
                        ..changes
                    },
                )
                .await?;
            writes += 1;
        }

        Ok(if writes == 0 {
            SyncOutcome::Unchanged
        } else {
            SyncOutcome::Applied(writes)
        })
    }

    /// Tasks of a deleted block go with it.
    pub(super) async fn on_block_deleted(
        &self,
        actor: DbId,
        payload: &BlockPayload,
    ) -> Result<SyncOutcome, SyncError> {
        let tasks = self.store.list_tasks_by_block(payload.id).await?;
        if tasks.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        // The block is gone, so authorize against the note it lived in.
        let note_id = payload
            .note_id
            .ok_or_else(|| SyncError::Malformed("block.deleted without note_id".into()))?;
        self.ensure_editor(actor, ResourceRef::new(ResourceKind::Note, note_id))
            .await?;
        self.delete_tasks(actor, tasks.iter().map(|t| t.id)).await
    }

    async fn create_task_for(&self, actor: DbId, block: &Block) -> Result<SyncOutcome, SyncError> {
        self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
            .await?;

        let task = self
            .store
            .create_task(
                Some(actor),
                CreateTask {
                    user_id: block.user_id,
                    title: block.content.text.clone().unwrap_or_default(),
                    description: None,
                    is_completed: block.metadata.is_completed.unwrap_or(false),
                    block_id: Some(block.id),
                    metadata: TaskMetadata {
                        note_id: Some(block.note_id),
                        ..Default::default()
                    },
                    sync_source: Some(SyncSource::Task),
                },
            )
            .await?;

        // Record the link on the block side as well.
        let mut metadata = block.metadata.clone();
        metadata.task_id = Some(task.id);
        metadata.task_deleted = None;
        metadata.task_deleted_at = None;
        self.store
            .update_block(
                Some(actor),
                block.id,
                UpdateBlock {
                    metadata: Some(metadata),
                    sync_source: Some(SyncSource::Block),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(block_id = %block.id, task_id = %task.id, "Task created for block");
        Ok(SyncOutcome::Applied(2))
    }

    async fn delete_tasks(
        &self,
        actor: DbId,
        task_ids: impl Iterator<Item = DbId>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut writes = 0;
        for task_id in task_ids {
            self.store
                .delete_task(Some(actor), task_id, Some(SyncSource::Task))
                .await?;
            tracing::info!(task_id = %task_id, "Task removed with its block");
            writes += 1;
        }
        Ok(SyncOutcome::Applied(writes))
    }
}
