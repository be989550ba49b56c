//! Notebook entity model.

use serde::Serialize;
use sqlx::FromRow;
use quill_core::types::{DbId, Timestamp};

/// A row from the `notebooks` table. Root of the resource hierarchy.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notebook {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
