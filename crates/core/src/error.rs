//! Domain error taxonomy shared by every crate in the workspace.
//!
//! The HTTP layer maps each variant onto a status code; background
//! components only log them.

use crate::resource::ResourceKind;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The addressed row does not exist (or is soft-deleted).
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Malformed ids, unknown enum names, missing required fields.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but an access check returned `false`.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(kind: ResourceKind, id: DbId) -> Self {
        CoreError::NotFound {
            entity: kind.as_str(),
            id,
        }
    }
}
