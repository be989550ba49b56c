//! Task entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use quill_core::payload::{TaskMetadata, TaskPayload};
use quill_core::sync_marker::SyncSource;
use quill_core::types::{DbId, Timestamp};

/// A row from the `tasks` table.
///
/// `block_id` links the task to its inline block. It is a plain column, not
/// a foreign key: a deleted block must leave its tasks in place so the
/// synchronizer can find and remove them through the normal write path.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub block_id: Option<DbId>,
    #[sqlx(json)]
    pub metadata: TaskMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub user_id: DbId,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    pub block_id: Option<DbId>,
    #[serde(default)]
    pub metadata: TaskMetadata,
    #[serde(skip)]
    pub sync_source: Option<SyncSource>,
}

/// DTO for updating a task. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_completed: Option<bool>,
    pub block_id: Option<DbId>,
    pub metadata: Option<TaskMetadata>,
    /// Written into `metadata._sync_source`; `None` clears it.
    #[serde(skip)]
    pub sync_source: Option<SyncSource>,
}

impl Task {
    pub fn apply(&mut self, changes: &UpdateTask) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }
        if let Some(is_completed) = changes.is_completed {
            self.is_completed = is_completed;
        }
        if let Some(block_id) = changes.block_id {
            self.block_id = Some(block_id);
        }
        if let Some(metadata) = &changes.metadata {
            self.metadata = metadata.clone();
        }
        self.metadata.sync_source = changes.sync_source;
    }

    pub fn to_payload(&self) -> TaskPayload {
        TaskPayload {
            id: self.id,
            user_id: Some(self.user_id),
            title: Some(self.title.clone()),
            description: self.description.clone(),
            is_completed: Some(self.is_completed),
            block_id: self.block_id,
            metadata: Some(self.metadata.clone()),
            sync_source: self.metadata.sync_source,
        }
    }

    /// Snapshot for the `task.deleted` event, carrying only the marker of
    /// the deletion itself.
    pub fn deletion_payload(&self, sync_source: Option<SyncSource>) -> TaskPayload {
        let mut payload = self.to_payload();
        payload.sync_source = sync_source;
        if let Some(metadata) = payload.metadata.as_mut() {
            metadata.sync_source = sync_source;
        }
        payload
    }
}
