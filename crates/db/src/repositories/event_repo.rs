//! Repository for the `events` outbox table.

use sqlx::PgExecutor;
use quill_core::types::{new_id, DbId, Timestamp};

use crate::models::event::{NewEvent, OutboxEvent, EVENT_STATUS_COMPLETED, EVENT_STATUS_PENDING};

/// Column list for `events` queries.
const COLUMNS: &str = "id, event_type, entity, operation, actor_id, payload, status, \
    dispatched, dispatched_at, created_at";

/// Outbox reads and writes.
pub struct EventRepo;

impl EventRepo {
    /// Append an event. Always called inside the transaction of the entity
    /// write it describes.
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        event: &NewEvent,
    ) -> Result<OutboxEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (id, event_type, entity, operation, actor_id, payload, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(new_id())
            .bind(event.event_type())
            .bind(event.entity.as_str())
            .bind(event.operation)
            .bind(event.actor_id)
            .bind(&event.payload)
            .bind(EVENT_STATUS_PENDING)
            .fetch_one(executor)
            .await
    }

    /// All rows not yet dispatched, oldest first.
    pub async fn list_undispatched(
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events WHERE dispatched = false ORDER BY created_at, id"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .fetch_all(executor)
            .await
    }

    /// Flag an event as published. Returns `false` if the row is gone.
    pub async fn mark_dispatched(
        executor: impl PgExecutor<'_>,
        id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events SET dispatched = true, status = $2, dispatched_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(EVENT_STATUS_COMPLETED)
        .bind(at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
