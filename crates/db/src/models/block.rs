//! Block entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use quill_core::payload::{BlockContent, BlockMetadata, BlockPayload, BlockType};
use quill_core::sync_marker::SyncSource;
use quill_core::types::{DbId, Timestamp};

/// A row from the `blocks` table. Owned by its note.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Block {
    pub id: DbId,
    pub note_id: DbId,
    pub user_id: DbId,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[sqlx(json)]
    pub content: BlockContent,
    #[sqlx(json)]
    pub metadata: BlockMetadata,
    /// Position within the note. Column is `sort_order`.
    #[sqlx(rename = "sort_order")]
    pub order: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a block.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlock {
    pub note_id: DbId,
    pub user_id: DbId,
    pub block_type: BlockType,
    #[serde(default)]
    pub content: BlockContent,
    #[serde(default)]
    pub metadata: BlockMetadata,
    /// Appended after the last block of the note when omitted.
    pub order: Option<f64>,
    /// Marker for writes derived by the synchronizer.
    #[serde(skip)]
    pub sync_source: Option<SyncSource>,
}

/// DTO for updating a block. All fields are optional; `metadata` and
/// `content` replace the stored document wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlock {
    pub block_type: Option<BlockType>,
    pub content: Option<BlockContent>,
    pub metadata: Option<BlockMetadata>,
    pub order: Option<f64>,
    /// Written into `metadata._sync_source`. `None` clears a stale marker
    /// so ordinary edits are never mistaken for derived ones.
    #[serde(skip)]
    pub sync_source: Option<SyncSource>,
}

impl Block {
    /// Apply an update in place.
    pub fn apply(&mut self, changes: &UpdateBlock) {
        if let Some(block_type) = &changes.block_type {
            self.block_type = block_type.clone();
        }
        if let Some(content) = &changes.content {
            self.content = content.clone();
        }
        if let Some(metadata) = &changes.metadata {
            self.metadata = metadata.clone();
        }
        if let Some(order) = changes.order {
            self.order = order;
        }
        self.metadata.sync_source = changes.sync_source;
    }

    /// Event payload snapshot. The marker is surfaced at the top level too.
    pub fn to_payload(&self) -> BlockPayload {
        BlockPayload {
            id: self.id,
            note_id: Some(self.note_id),
            user_id: Some(self.user_id),
            block_type: Some(self.block_type.clone()),
            content: Some(self.content.clone()),
            metadata: Some(self.metadata.clone()),
            order: Some(self.order),
            sync_source: self.metadata.sync_source,
        }
    }

    /// Snapshot for the `block.deleted` event. The stored marker belongs to
    /// the last write, not to this deletion, so only `sync_source` is kept.
    pub fn deletion_payload(&self, sync_source: Option<SyncSource>) -> BlockPayload {
        let mut payload = self.to_payload();
        payload.sync_source = sync_source;
        if let Some(metadata) = payload.metadata.as_mut() {
            metadata.sync_source = sync_source;
        }
        payload
    }
}
