//! Repository for the `blocks` table.

use sqlx::types::Json;
use sqlx::PgExecutor;
use quill_core::types::DbId;

use crate::models::block::{Block, CreateBlock};

const COLUMNS: &str =
    "id, note_id, user_id, block_type, content, metadata, sort_order, created_at, updated_at";

/// Block reads and writes. Writes never touch the outbox themselves; the
/// store pairs them with an event in one transaction.
pub struct BlockRepo;

impl BlockRepo {
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Block>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM blocks WHERE id = $1");
        sqlx::query_as::<_, Block>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Same as [`find_by_id`](Self::find_by_id) but row-locked until the
    /// surrounding transaction ends.
    pub async fn find_for_update(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Block>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM blocks WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Block>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Insert a block. Without an explicit order it is appended after the
    /// last block of its note.
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        input: &CreateBlock,
    ) -> Result<Block, sqlx::Error> {
        let mut metadata = input.metadata.clone();
        metadata.sync_source = input.sync_source;
        let query = format!(
            "INSERT INTO blocks (note_id, user_id, block_type, content, metadata, sort_order) \
             VALUES ($1, $2, $3, $4, $5, \
                COALESCE($6, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM blocks WHERE note_id = $1))) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(input.note_id)
            .bind(input.user_id)
            .bind(input.block_type.as_str())
            .bind(Json(&input.content))
            .bind(Json(&metadata))
            .bind(input.order)
            .fetch_one(executor)
            .await
    }

    /// Persist every mutable column of an already-loaded block.
    pub async fn save(executor: impl PgExecutor<'_>, block: &Block) -> Result<Block, sqlx::Error> {
        let query = format!(
            "UPDATE blocks SET block_type = $2, content = $3, metadata = $4, sort_order = $5, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(block.id)
            .bind(block.block_type.as_str())
            .bind(Json(&block.content))
            .bind(Json(&block.metadata))
            .bind(block.order)
            .fetch_one(executor)
            .await
    }

    /// Hard-delete a block, returning the removed row.
    pub async fn delete(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Block>, sqlx::Error> {
        let query = format!("DELETE FROM blocks WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Block>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
