//! Repository for the `notes` table.

use sqlx::PgExecutor;
use quill_core::types::DbId;

use crate::models::note::{CreateNote, Note};

const COLUMNS: &str = "id, user_id, notebook_id, title, is_primary, created_at, updated_at";

/// Note lookups used by access resolution and target-note resolution.
pub struct NoteRepo;

impl NoteRepo {
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Note>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notes WHERE id = $1");
        sqlx::query_as::<_, Note>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The note flagged as the user's primary note.
    pub async fn find_primary(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
    ) -> Result<Option<Note>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes WHERE user_id = $1 AND is_primary = true LIMIT 1"
        );
        sqlx::query_as::<_, Note>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// The user's oldest note.
    pub async fn find_oldest(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
    ) -> Result<Option<Note>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes WHERE user_id = $1 ORDER BY created_at, id LIMIT 1"
        );
        sqlx::query_as::<_, Note>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn insert(
        executor: impl PgExecutor<'_>,
        input: &CreateNote,
    ) -> Result<Note, sqlx::Error> {
        let query = format!(
            "INSERT INTO notes (user_id, notebook_id, title, is_primary) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Note>(&query)
            .bind(input.user_id)
            .bind(input.notebook_id)
            .bind(&input.title)
            .bind(input.is_primary)
            .fetch_one(executor)
            .await
    }
}
