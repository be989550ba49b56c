//! Quill event bus and outbox dispatch.
//!
//! - [`EventBus`]: in-process topic bus backed by `tokio::sync::broadcast`.
//! - [`Publisher`]: the seam the dispatcher publishes through.
//! - [`topics`]: one topic per entity kind plus a fallback.
//! - [`envelope::build_envelope`]: outbox row to canonical bus message.
//! - [`OutboxDispatcher`]: background mover from the `events` table to the bus.

pub mod bus;
pub mod dispatcher;
pub mod envelope;
pub mod topics;

pub use bus::{BusMessage, EventBus, PublishError, Publisher};
pub use dispatcher::{DispatchReport, OutboxDispatcher};
