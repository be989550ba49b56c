//! Quill domain vocabulary.
//!
//! Zero internal dependencies: everything here is pure data and pure
//! functions shared by the persistence layer, the event bus and the server.

pub mod envelope;
pub mod error;
pub mod payload;
pub mod realtime;
pub mod resource;
pub mod roles;
pub mod sync_marker;
pub mod types;
