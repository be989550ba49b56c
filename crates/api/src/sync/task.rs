//! Task-side transitions: make sure every task has a task-typed block and
//! push task edits onto it.

use quill_core::payload::{BlockContent, BlockMetadata, BlockType, TaskPayload};
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::sync_marker::SyncSource;
use quill_core::types::{DbId, Timestamp};
use quill_db::models::block::{Block, CreateBlock, UpdateBlock};
use quill_db::models::note::{CreateNote, Note};
use quill_db::models::task::{Task, UpdateTask};

use super::{BlockTaskSynchronizer, SyncError, SyncOutcome};

/// Title of the note created when a user has nowhere to put a task block.
const FALLBACK_NOTE_TITLE: &str = "Tasks";

impl BlockTaskSynchronizer {
    pub(super) async fn on_task_created(
        &self,
        actor: DbId,
        task_id: DbId,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(task) = self.store.find_task(task_id).await? else {
            return Ok(SyncOutcome::Unchanged);
        };
        match self.linked_block(&task).await? {
            Some(block) if block.block_type.is_task() => Ok(SyncOutcome::Unchanged),
            Some(block) => self.coerce_block(actor, &task, &block).await,
            None => self.synthesize_block(actor, &task).await,
        }
    }

    /// Like creation, except that an existing task block receives the
    /// fields present in the update, when they differ.
    pub(super) async fn on_task_updated(
        &self,
        actor: DbId,
        payload: &TaskPayload,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(task) = self.store.find_task(payload.id).await? else {
            return Ok(SyncOutcome::Unchanged);
        };
        let block = match self.linked_block(&task).await? {
            None => return self.synthesize_block(actor, &task).await,
            Some(block) if !block.block_type.is_task() => {
                return self.coerce_block(actor, &task, &block).await
            }
            Some(block) => block,
        };

        let new_text = payload
            .title
            .as_ref()
            .filter(|title| block.content.text.as_ref() != Some(*title));
        let new_completed = payload
            .is_completed
            .filter(|done| block.metadata.is_completed != Some(*done));
        if new_text.is_none() && new_completed.is_none() {
            return Ok(SyncOutcome::Unchanged);
        }

        self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
            .await?;

        let mut changes = UpdateBlock {
            sync_source: Some(SyncSource::Block),
            ..Default::default()
        };
        if let Some(text) = new_text {
            let mut content = block.content.clone();
            content.text = Some(text.clone());
            changes.content = Some(content);
        }
        if let Some(done) = new_completed {
            let mut metadata = block.metadata.clone();
            metadata.is_completed = Some(done);
            changes.metadata = Some(metadata);
        }
        self.store
            .update_block(Some(actor), block.id, changes)
            .await?;

        tracing::debug!(task_id = %task.id, block_id = %block.id, "Task change pushed to block");
        Ok(SyncOutcome::Applied(1))
    }

    /// Leave a tombstone on the block. The block stays in the note body.
    pub(super) async fn on_task_deleted(
        &self,
        actor: DbId,
        payload: &TaskPayload,
        deleted_at: Timestamp,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(block_id) = payload.block_id else {
            return Ok(SyncOutcome::Unchanged);
        };
        let Some(block) = self.store.find_block(block_id).await? else {
            return Ok(SyncOutcome::Unchanged);
        };
        // Relinked to a different task since, or already tombstoned.
        if block.metadata.task_id.is_some_and(|id| id != payload.id)
            || block.metadata.task_deleted == Some(true)
        {
            return Ok(SyncOutcome::Unchanged);
        }

        self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
            .await?;

        let mut metadata = block.metadata.clone();
        metadata.task_deleted = Some(true);
        metadata.task_deleted_at = Some(deleted_at);
        metadata.task_id = Some(payload.id);
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

        tracing::info!(task_id = %payload.id, block_id = %block.id, "Block marked task_deleted");
        Ok(SyncOutcome::Applied(1))
    }

    async fn linked_block(&self, task: &Task) -> Result<Option<Block>, SyncError> {
        match task.block_id {
            Some(block_id) => Ok(self.store.find_block(block_id).await?),
            None => Ok(None),
        }
    }

    /// Turn an existing non-task block into the task's block.
    async fn coerce_block(
        &self,
        actor: DbId,
        task: &Task,
        block: &Block,
    ) -> Result<SyncOutcome, SyncError> {
        self.ensure_editor(actor, ResourceRef::new(ResourceKind::Block, block.id))
            .await?;

        let mut content = block.content.clone();
        content.text = Some(task.title.clone());
        self.store
            .update_block(
                Some(actor),
                block.id,
                UpdateBlock {
                    block_type: Some(BlockType::Task),
                    content: Some(content),
                    metadata: Some(task_block_metadata(task, block.metadata.clone())),
                    sync_source: Some(SyncSource::Block),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(task_id = %task.id, block_id = %block.id, "Block coerced to task");
        Ok(SyncOutcome::Applied(1))
    }

    /// Create a task block in the resolved target note and link the task
    /// back to it.
    async fn synthesize_block(&self, actor: DbId, task: &Task) -> Result<SyncOutcome, SyncError> {
        let (note, mut writes) = self.resolve_target_note(actor, task).await?;

        let block = self
            .store
            .create_block(
                Some(actor),
                CreateBlock {
                    note_id: note.id,
                    user_id: task.user_id,
                    block_type: BlockType::Task,
                    content: BlockContent::with_text(task.title.clone()),
                    metadata: task_block_metadata(task, BlockMetadata::default()),
                    order: None,
                    sync_source: Some(SyncSource::Block),
                },
            )
            .await?;

        let mut metadata = task.metadata.clone();
        metadata.note_id = Some(note.id);
        self.store
            .update_task(
                Some(actor),
                task.id,
                UpdateTask {
                    block_id: Some(block.id),
                    metadata: Some(metadata),
                    sync_source: Some(SyncSource::Task),
                    ..Default::default()
                },
            )
            .await?;
        writes += 2;

        tracing::info!(
            task_id = %task.id,
            block_id = %block.id,
            note_id = %note.id,
            "Block synthesized for task",
        );
        Ok(SyncOutcome::Applied(writes))
    }

    /// Where a synthesized block goes: the note recorded on the task, the
    /// owner's primary note, any note of the owner, or a new note. Notes the
    /// actor cannot edit are skipped. Returns the note and the number of
    /// writes it took.
    async fn resolve_target_note(
        &self,
        actor: DbId,
        task: &Task,
    ) -> Result<(Note, usize), SyncError> {
        if let Some(note_id) = task.metadata.note_id {
            let preferred = self.store.find_note(note_id).await?;
            if let Some(note) = self.editable_note(actor, preferred).await? {
                return Ok((note, 0));
            }
        }

        let primary = self.store.find_primary_note(task.user_id).await?;
        let has_primary = primary.is_some();
        if let Some(note) = self.editable_note(actor, primary).await? {
            return Ok((note, 0));
        }

        let any = self.store.find_any_note(task.user_id).await?;
        if let Some(note) = self.editable_note(actor, any).await? {
            return Ok((note, 0));
        }

        // Creating a note for the task's owner requires acting as them.
        self.ensure_editor(actor, ResourceRef::new(ResourceKind::User, task.user_id))
            .await?;
        let note = self
            .store
            .create_note(
                Some(actor),
                CreateNote {
                    user_id: task.user_id,
                    notebook_id: None,
                    title: FALLBACK_NOTE_TITLE.to_string(),
                    is_primary: !has_primary,
                },
            )
            .await?;
        tracing::info!(note_id = %note.id, user_id = %task.user_id, "Note created for task blocks");
        Ok((note, 1))
    }

    async fn editable_note(
        &self,
        actor: DbId,
        note: Option<Note>,
    ) -> Result<Option<Note>, SyncError> {
        let Some(note) = note else {
            return Ok(None);
        };
        let resource = ResourceRef::new(ResourceKind::Note, note.id);
        Ok(self.can_edit(actor, resource).await?.then_some(note))
    }
}

/// Block metadata mirroring `task`, keeping unrelated keys of `base`.
fn task_block_metadata(task: &Task, base: BlockMetadata) -> BlockMetadata {
    BlockMetadata {
        is_completed: Some(task.is_completed),
        task_id: Some(task.id),
        task_deleted: None,
        task_deleted_at: None,
        ..base
    }
}
