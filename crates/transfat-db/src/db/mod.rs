//! Repository implementations
//
// Postgres repositories
pub mod task;
pub mod upload;
//
// In-memory stores
pub mod memory;

pub use memory::{MemoryTaskStore, MemoryUploadSessionStore};
pub use task::PgTaskRepository;
pub use upload::PgUploadSessionRepository;
