//! Repository for the `notebooks` table.

use sqlx::PgExecutor;
use quill_core::types::DbId;

use crate::models::notebook::Notebook;

const COLUMNS: &str = "id, user_id, name, created_at, updated_at";

pub struct NotebookRepo;

impl NotebookRepo {
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Notebook>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notebooks WHERE id = $1");
        sqlx::query_as::<_, Notebook>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
