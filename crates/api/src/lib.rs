//! Quill realtime backbone server library.
//!
//! Exposes the building blocks (config, state, error handling, access
//! resolution, block/task synchronization, realtime fan-out, routes) so the
//! binary entrypoint and integration tests share one construction path.

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod sync;
pub mod ws;
