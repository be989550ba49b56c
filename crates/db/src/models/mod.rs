//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts
//! - An update DTO (all `Option` fields) for patches, where the entity is
//!   mutable through the store

pub mod block;
pub mod event;
pub mod note;
pub mod notebook;
pub mod role;
pub mod task;
