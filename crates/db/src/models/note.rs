//! Note entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use quill_core::payload::NotePayload;
use quill_core::types::{DbId, Timestamp};

/// A row from the `notes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Note {
    pub id: DbId,
    pub user_id: DbId,
    /// `None` for notes that live outside any notebook.
    pub notebook_id: Option<DbId>,
    pub title: String,
    /// The user's default landing note. At most one per user.
    pub is_primary: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a note.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNote {
    pub user_id: DbId,
    pub notebook_id: Option<DbId>,
    pub title: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl Note {
    pub fn to_payload(&self) -> NotePayload {
        NotePayload {
            id: self.id,
            user_id: Some(self.user_id),
            notebook_id: self.notebook_id,
            title: Some(self.title.clone()),
        }
    }
}
