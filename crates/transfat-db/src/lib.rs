//! Transfat Database Layer
//!
//! Persistence for upload sessions and queued tasks. Callers depend on the
//! [`UploadSessionStore`] and [`TaskStore`] traits; Postgres backs them in
//! production and process-local maps back them in tests and single-node
//! development.

pub mod db;
pub mod store_traits;

pub use db::{
    MemoryTaskStore, MemoryUploadSessionStore, PgTaskRepository, PgUploadSessionRepository,
};
pub use store_traits::{TaskStore, UploadSessionStore};
