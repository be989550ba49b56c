//! Handlers for access checks and role assignment.
//!
//! Both endpoints require authentication via [`AuthUser`].

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use quill_core::error::CoreError;
use quill_core::resource::ResourceKind;
use quill_core::roles::RoleLevel;
use quill_db::models::role::AssignRole;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default = "default_min_role")]
    pub min_role: String,
}

fn default_min_role() -> String {
    RoleLevel::Viewer.as_str().to_string()
}

#[derive(Debug, Serialize)]
pub struct AccessCheck {
    pub resource_id: String,
    pub resource_type: String,
    pub min_role: String,
    pub allowed: bool,
}

/// GET /api/v1/access
///
/// Whether the caller holds at least `min_role` (default `viewer`) on the
/// resource. Malformed ids, types or roles are a 400.
pub async fn check_access(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> AppResult<impl IntoResponse> {
    let allowed = state
        .access
        .has_access_raw(
            &auth.user_id.to_string(),
            &query.resource_id,
            &query.resource_type,
            &query.min_role,
        )
        .await?;

    Ok(Json(DataResponse {
        data: AccessCheck {
            resource_id: query.resource_id,
            resource_type: query.resource_type,
            min_role: query.min_role,
            allowed,
        },
    }))
}

/// PUT /api/v1/roles
///
/// Grant `role` to `user_id`, replacing any existing grant on the same
/// resource. The caller must hold `owner` on the resource. Grants on user
/// resources and `admin` grants need a system admin caller.
pub async fn assign_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<AssignRole>,
) -> AppResult<impl IntoResponse> {
    let privileged = input.resource_type == ResourceKind::User || input.role == RoleLevel::Admin;
    if privileged && !state.access.is_system_admin(auth.user_id).await? {
        tracing::warn!(
            caller = %auth.user_id,
            resource_type = %input.resource_type,
            role = %input.role,
            "Privileged role assignment refused",
        );
        return Err(AppError::Core(CoreError::Forbidden(
            "System admin required to grant admin or user roles".to_string(),
        )));
    }

    let permitted = state
        .access
        .has_access(
            auth.user_id,
            input.resource_id,
            input.resource_type,
            RoleLevel::Owner,
        )
        .await?;
    if !permitted {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Owner role required on {} {}",
            input.resource_type, input.resource_id
        ))));
    }

    let grant = state
        .access
        .assign_role(
            input.user_id,
            input.resource_id,
            input.resource_type,
            input.role,
        )
        .await?;

    tracing::info!(
        granted_by = %auth.user_id,
        user_id = %grant.user_id,
        role = %grant.role,
        "Role assignment accepted",
    );

    Ok(Json(DataResponse { data: grant }))
}
