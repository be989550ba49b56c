//! Repository for the `roles` table.

use sqlx::PgExecutor;
use quill_core::resource::ResourceRef;
use quill_core::roles::RoleLevel;
use quill_core::types::DbId;

use crate::models::role::RoleGrant;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, resource_id, resource_type, role, created_at, updated_at";

/// Role grant lookups and assignment.
pub struct RoleRepo;

impl RoleRepo {
    /// The grant a user holds on exactly this resource, if any.
    pub async fn find(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
        resource: ResourceRef,
    ) -> Result<Option<RoleGrant>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM roles \
             WHERE user_id = $1 AND resource_id = $2 AND resource_type = $3"
        );
        sqlx::query_as::<_, RoleGrant>(&query)
            .bind(user_id)
            .bind(resource.id)
            .bind(resource.kind.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Insert a grant or overwrite the role of the existing one for the same
    /// `(user, resource)` triple. A single statement, so concurrent assigns
    /// cannot both insert.
    pub async fn upsert(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
        resource: ResourceRef,
        role: RoleLevel,
    ) -> Result<RoleGrant, sqlx::Error> {
        let query = format!(
            "INSERT INTO roles (user_id, resource_id, resource_type, role) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT uq_roles_user_resource \
             DO UPDATE SET role = EXCLUDED.role, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RoleGrant>(&query)
            .bind(user_id)
            .bind(resource.id)
            .bind(resource.kind.as_str())
            .bind(role.as_str())
            .fetch_one(executor)
            .await
    }
}
