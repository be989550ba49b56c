use std::sync::Arc;

use quill_db::Store;

use crate::access::AccessResolver;
use crate::config::ServerConfig;
use crate::ws::HubHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Persistence seam (Postgres in production, in-memory in tests).
    pub store: Arc<dyn Store>,
    pub config: Arc<ServerConfig>,
    pub access: Arc<AccessResolver>,
    /// Realtime fan-out hub.
    pub hub: HubHandle,
}
