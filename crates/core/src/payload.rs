//! Typed event payloads, one per entity kind.
//!
//! Block content and block/task metadata are open-ended JSON documents in
//! storage. The fields the backbone reads are modelled explicitly; every
//! other key is kept in an `extra` map so a round trip through these types
//! never loses data written by the editor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::ResourceKind;
use crate::sync_marker::SyncSource;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Block type
// ---------------------------------------------------------------------------

pub const BLOCK_TYPE_TEXT: &str = "text";
pub const BLOCK_TYPE_HEADING: &str = "heading";
pub const BLOCK_TYPE_TASK: &str = "task";
pub const BLOCK_TYPE_CODE: &str = "code";

/// Kind of an inline block. Kinds this service has no opinion on are kept
/// verbatim in [`BlockType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Text,
    Heading,
    Task,
    Code,
    Other(String),
}

impl BlockType {
    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Text => BLOCK_TYPE_TEXT,
            BlockType::Heading => BLOCK_TYPE_HEADING,
            BlockType::Task => BLOCK_TYPE_TASK,
            BlockType::Code => BLOCK_TYPE_CODE,
            BlockType::Other(s) => s,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, BlockType::Task)
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        match s.as_str() {
            BLOCK_TYPE_TEXT => BlockType::Text,
            BLOCK_TYPE_HEADING => BlockType::Heading,
            BLOCK_TYPE_TASK => BlockType::Task,
            BLOCK_TYPE_CODE => BlockType::Code,
            _ => BlockType::Other(s),
        }
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        BlockType::from(s.to_string())
    }
}

impl From<BlockType> for String {
    fn from(t: BlockType) -> Self {
        t.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Content / metadata documents
// ---------------------------------------------------------------------------

/// Rich-text block content. Only `text` is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockContent {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

/// Block metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<DbId>,
    /// Tombstone left when the linked task is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_deleted_at: Option<Timestamp>,
    #[serde(
        rename = "_sync_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_source: Option<SyncSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Task metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Note a block for this task should preferably be created in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<DbId>,
    #[serde(
        rename = "_sync_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_source: Option<SyncSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Per-entity payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookPayload {
    pub id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Snapshot of a block as carried in `block.*` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BlockContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BlockMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(
        rename = "_sync_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_source: Option<SyncSource>,
}

impl BlockPayload {
    /// Marker on the payload itself, falling back to the one in metadata.
    pub fn sync_marker(&self) -> Option<SyncSource> {
        self.sync_source
            .or_else(|| self.metadata.as_ref().and_then(|m| m.sync_source))
    }

    pub fn is_task(&self) -> bool {
        self.block_type.as_ref().is_some_and(BlockType::is_task)
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.text.as_deref())
    }

    pub fn is_completed(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|m| m.is_completed)
    }
}

/// Snapshot of a task as carried in `task.*` events.
///
/// Update events may carry only the fields that changed; absent fields are
/// `None` and must not be propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,
    #[serde(
        rename = "_sync_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_source: Option<SyncSource>,
}

impl TaskPayload {
    pub fn sync_marker(&self) -> Option<SyncSource> {
        self.sync_source
            .or_else(|| self.metadata.as_ref().and_then(|m| m.sync_source))
    }

    pub fn preferred_note_id(&self) -> Option<DbId> {
        self.metadata.as_ref().and_then(|m| m.note_id)
    }
}

/// Decoded `data` section of an event envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Note(NotePayload),
    Notebook(NotebookPayload),
    Block(BlockPayload),
    Task(TaskPayload),
    User(UserPayload),
}

impl EventData {
    pub fn kind(&self) -> ResourceKind {
        match self {
            EventData::Note(_) => ResourceKind::Note,
            EventData::Notebook(_) => ResourceKind::Notebook,
            EventData::Block(_) => ResourceKind::Block,
            EventData::Task(_) => ResourceKind::Task,
            EventData::User(_) => ResourceKind::User,
        }
    }

    /// Decode a raw payload for the given entity kind.
    pub fn from_value(kind: ResourceKind, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ResourceKind::Note => EventData::Note(serde_json::from_value(data)?),
            ResourceKind::Notebook => EventData::Notebook(serde_json::from_value(data)?),
            ResourceKind::Block => EventData::Block(serde_json::from_value(data)?),
            ResourceKind::Task => EventData::Task(serde_json::from_value(data)?),
            ResourceKind::User => EventData::User(serde_json::from_value(data)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sync_marker::SyncSource;

    #[test]
    fn block_metadata_preserves_unknown_keys() {
        let raw = json!({
            "is_completed": true,
            "color": "red",
            "_sync_source": "block",
        });
        let meta: BlockMetadata = serde_json::from_value(raw).unwrap();
        assert_eq!(meta.is_completed, Some(true));
        assert_eq!(meta.sync_source, Some(SyncSource::Block));
        assert_eq!(meta.extra.get("color"), Some(&json!("red")));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["color"], "red");
        assert_eq!(back["_sync_source"], "block");
        assert!(back.get("task_id").is_none());
    }

    #[test]
    fn unknown_block_types_survive() {
        let t: BlockType = serde_json::from_value(json!("callout")).unwrap();
        assert_eq!(t, BlockType::Other("callout".into()));
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("callout"));
        assert!(BlockType::from("task").is_task());
    }

    #[test]
    fn sync_marker_is_read_from_payload_or_metadata() {
        let top: TaskPayload = serde_json::from_value(json!({
            "id": uuid::Uuid::nil(),
            "_sync_source": "task",
        }))
        .unwrap();
        assert_eq!(top.sync_marker(), Some(SyncSource::Task));

        let nested: BlockPayload = serde_json::from_value(json!({
            "id": uuid::Uuid::nil(),
            "metadata": { "_sync_source": "block" },
        }))
        .unwrap();
        assert_eq!(nested.sync_marker(), Some(SyncSource::Block));

        let plain: BlockPayload =
            serde_json::from_value(json!({ "id": uuid::Uuid::nil() })).unwrap();
        assert_eq!(plain.sync_marker(), None);
    }

    #[test]
    fn payload_without_id_is_rejected() {
        let result = EventData::from_value(ResourceKind::Block, json!({ "type": "task" }));
        assert!(result.is_err());
    }

    #[test]
    fn partial_task_update_leaves_absent_fields_empty() {
        let payload: TaskPayload = serde_json::from_value(json!({
            "id": uuid::Uuid::nil(),
            "is_completed": true,
        }))
        .unwrap();
        assert_eq!(payload.is_completed, Some(true));
        assert!(payload.title.is_none());
    }
}
