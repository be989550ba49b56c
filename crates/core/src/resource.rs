//! The closed set of resource kinds and their place in the ownership tree.
//!
//! Block/Task -> Note -> Notebook is a strict tree; `User` stands alone.
//! Access inheritance walks this tree upwards, so the parent relation lives
//! here rather than being re-derived by every caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Note,
    Notebook,
    Block,
    Task,
    User,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Note,
        ResourceKind::Notebook,
        ResourceKind::Block,
        ResourceKind::Task,
        ResourceKind::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Note => "note",
            ResourceKind::Notebook => "notebook",
            ResourceKind::Block => "block",
            ResourceKind::Task => "task",
            ResourceKind::User => "user",
        }
    }

    /// Kind of the node one level up, if any.
    ///
    /// A task's parent is the note of the block it is linked to; a task
    /// without a block has no parent at all.
    pub fn parent_kind(self) -> Option<ResourceKind> {
        match self {
            ResourceKind::Block | ResourceKind::Task => Some(ResourceKind::Note),
            ResourceKind::Note => Some(ResourceKind::Notebook),
            ResourceKind::Notebook | ResourceKind::User => None,
        }
    }

    /// Name of the `<kind>_id` field used for this kind in payloads.
    pub fn id_field(self) -> &'static str {
        match self {
            ResourceKind::Note => "note_id",
            ResourceKind::Notebook => "notebook_id",
            ResourceKind::Block => "block_id",
            ResourceKind::Task => "task_id",
            ResourceKind::User => "user_id",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown resource type '{s}'. Must be one of: note, notebook, block, task, user"
                ))
            })
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A typed pointer to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: crate::types::DbId,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: crate::types::DbId) -> Self {
        Self { kind, id }
    }
}
