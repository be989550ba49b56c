//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Methods take any Postgres executor so the same query runs against the
//! pool or inside a transaction opened by [`crate::store::postgres::PgStore`].

pub mod block_repo;
pub mod event_repo;
pub mod note_repo;
pub mod notebook_repo;
pub mod role_repo;
pub mod task_repo;

pub use block_repo::BlockRepo;
pub use event_repo::EventRepo;
pub use note_repo::NoteRepo;
pub use notebook_repo::NotebookRepo;
pub use role_repo::RoleRepo;
pub use task_repo::TaskRepo;
