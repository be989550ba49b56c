//! Realtime fan-out over WebSocket.
//!
//! [`hub`] owns the connection registry and routes bus events to clients;
//! the handler upgrades HTTP requests and runs the per-connection reader and
//! writer.

mod handler;
mod heartbeat;
pub mod hub;

pub use handler::ws_handler;
pub use hub::{ClientId, Hub, HubError, HubHandle};
