pub mod health;

use axum::routing::{get, put};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws          WebSocket upgrade (token via ?token= or bearer header)
/// /access      GET access check for the caller
/// /roles       PUT assign a role
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/access", get(handlers::access::check_access))
        .route("/roles", put(handlers::access::assign_role))
}
