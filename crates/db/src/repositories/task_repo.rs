//! Repository for the `tasks` table.

use sqlx::types::Json;
use sqlx::PgExecutor;
use quill_core::types::DbId;

use crate::models::task::{CreateTask, Task};

const COLUMNS: &str =
    "id, user_id, title, description, is_completed, block_id, metadata, created_at, updated_at";

pub struct TaskRepo;

impl TaskRepo {
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_for_update(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Tasks linked to a block, oldest first.
    pub async fn list_by_block(
        executor: impl PgExecutor<'_>,
        block_id: DbId,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE block_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(block_id)
            .fetch_all(executor)
            .await
    }

    pub async fn insert(
        executor: impl PgExecutor<'_>,
        input: &CreateTask,
    ) -> Result<Task, sqlx::Error> {
        let mut metadata = input.metadata.clone();
        metadata.sync_source = input.sync_source;
        let query = format!(
            "INSERT INTO tasks (user_id, title, description, is_completed, block_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(input.user_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.is_completed)
            .bind(input.block_id)
            .bind(Json(&metadata))
            .fetch_one(executor)
            .await
    }

    pub async fn save(executor: impl PgExecutor<'_>, task: &Task) -> Result<Task, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET title = $2, description = $3, is_completed = $4, block_id = $5, \
                metadata = $6, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.is_completed)
            .bind(task.block_id)
            .bind(Json(&task.metadata))
            .fetch_one(executor)
            .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("DELETE FROM tasks WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
