//! Role grant entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::types::{DbId, Timestamp};

/// A row from the `roles` table: one user's level on one resource.
///
/// Unique per `(user_id, resource_id, resource_type)`. A grant with
/// `resource_type = user` and `resource_id = user_id` is system-level.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoleGrant {
    pub id: DbId,
    pub user_id: DbId,
    pub resource_id: DbId,
    #[sqlx(try_from = "String")]
    pub resource_type: ResourceKind,
    #[sqlx(try_from = "String")]
    pub role: RoleLevel,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RoleGrant {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(self.resource_type, self.resource_id)
    }

    /// Whether this is the `user/self/admin` system administrator grant.
    pub fn is_system_admin(&self) -> bool {
        self.resource_type == ResourceKind::User
            && self.resource_id == self.user_id
            && self.role == RoleLevel::Admin
    }
}

/// DTO for assigning a role.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRole {
    pub user_id: DbId,
    pub resource_id: DbId,
    pub resource_type: ResourceKind,
    pub role: RoleLevel,
}
