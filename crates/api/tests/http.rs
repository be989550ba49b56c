//! Router-level tests: health, access checks and role assignment.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, get, send, token_for, Fixture};
use quill_core::resource::ResourceKind;
use quill_core::roles::RoleLevel;
use quill_core::types::new_id;
use serde_json::json;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok_with_request_id() {
    let fx = Fixture::new();
    let (app, _hub) = fx.app();

    let response = get(app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
    assert_eq!(json["connections"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn health_is_degraded_when_store_is_down() {
    let fx = Fixture::new();
    fx.store.set_unavailable(true);
    let (app, _hub) = fx.app();

    let json = body_json(get(app, "/health", None).await).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["db_healthy"], false);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let fx = Fixture::new();
    let (app, _hub) = fx.app();

    let response = get(app, "/this-route-does-not-exist", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// GET /api/v1/access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn access_check_requires_a_token() {
    let fx = Fixture::new();
    let (app, _hub) = fx.app();

    let uri = format!("/api/v1/access?resource_id={}&resource_type=note", new_id());
    let response = get(app, &uri, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn access_check_answers_for_the_caller() {
    let fx = Fixture::new();
    let (owner, stranger) = (new_id(), new_id());
    let note = fx.note(owner, "Mine", true).await;
    let uri = format!(
        "/api/v1/access?resource_id={}&resource_type=note&min_role=owner",
        note.id
    );

    let (app, _hub) = fx.app();
    let json = body_json(get(app, &uri, Some(&token_for(owner))).await).await;
    assert_eq!(json["data"]["allowed"], true);
    assert_eq!(json["data"]["min_role"], "owner");

    let (app, _hub) = fx.app();
    let json = body_json(get(app, &uri, Some(&token_for(stranger))).await).await;
    assert_eq!(json["data"]["allowed"], false);
}

#[tokio::test]
async fn malformed_access_check_is_a_bad_request() {
    let fx = Fixture::new();
    let (app, _hub) = fx.app();

    let response = get(
        app,
        "/api/v1/access?resource_id=nope&resource_type=note",
        Some(&token_for(new_id())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let fx = Fixture::new();
    let (app, _hub) = fx.app();

    let uri = format!("/api/v1/access?resource_id={}&resource_type=note", new_id());
    let response = get(app, &uri, Some("not.a.jwt")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// PUT /api/v1/roles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn note_owner_can_share_the_note() {
    let fx = Fixture::new();
    let (owner, guest) = (new_id(), new_id());
    let note = fx.note(owner, "Shared", false).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(owner)),
        Some(json!({
            "user_id": guest,
            "resource_id": note.id,
            "resource_type": "note",
            "role": "editor",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["role"], "editor");
    assert_eq!(json["data"]["resource_type"], "note");

    assert!(fx
        .access
        .has_access(guest, note.id, ResourceKind::Note, RoleLevel::Editor)
        .await
        .unwrap());
}

#[tokio::test]
async fn editor_cannot_assign_roles() {
    let fx = Fixture::new();
    let (owner, editor) = (new_id(), new_id());
    let note = fx.note(owner, "Shared", false).await;
    fx.grant(editor, ResourceKind::Note, note.id, RoleLevel::Editor).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(editor)),
        Some(json!({
            "user_id": editor,
            "resource_id": note.id,
            "resource_type": "note",
            "role": "owner",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!fx
        .access
        .has_access(editor, note.id, ResourceKind::Note, RoleLevel::Owner)
        .await
        .unwrap());
}

#[tokio::test]
async fn users_cannot_make_themselves_admin() {
    let fx = Fixture::new();
    let (victim, mallory) = (new_id(), new_id());
    let note = fx.note(victim, "Diary", false).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(mallory)),
        Some(json!({
            "user_id": mallory,
            "resource_id": mallory,
            "resource_type": "user",
            "role": "admin",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(!fx.access.is_system_admin(mallory).await.unwrap());
    assert!(!fx
        .access
        .has_access(mallory, note.id, ResourceKind::Note, RoleLevel::Viewer)
        .await
        .unwrap());
}

#[tokio::test]
async fn note_owner_cannot_grant_admin() {
    let fx = Fixture::new();
    let (owner, guest) = (new_id(), new_id());
    let note = fx.note(owner, "Shared", false).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(owner)),
        Some(json!({
            "user_id": guest,
            "resource_id": note.id,
            "resource_type": "note",
            "role": "admin",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn system_admin_can_assign_anywhere() {
    let fx = Fixture::new();
    let (owner, admin, guest) = (new_id(), new_id(), new_id());
    let note = fx.note(owner, "Private", false).await;
    fx.grant(admin, ResourceKind::User, admin, RoleLevel::Admin).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(admin)),
        Some(json!({
            "user_id": guest,
            "resource_id": note.id,
            "resource_type": "note",
            "role": "viewer",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn system_admin_can_appoint_another_admin() {
    let fx = Fixture::new();
    let (admin, deputy) = (new_id(), new_id());
    fx.grant(admin, ResourceKind::User, admin, RoleLevel::Admin).await;

    let (app, _hub) = fx.app();
    let response = send(
        app,
        Method::PUT,
        "/api/v1/roles",
        Some(&token_for(admin)),
        Some(json!({
            "user_id": deputy,
            "resource_id": deputy,
            "resource_type": "user",
            "role": "admin",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(fx.access.is_system_admin(deputy).await.unwrap());
}
