//! Transfat API Library
//!
//! HTTP handlers, the upload coordinator, authentication, and application
//! setup. The binary in `main.rs` is a thin wrapper around [`setup`].

pub mod constants;
mod handlers;
pub mod services;
pub mod setup;
mod task_dispatch;
mod task_handlers;
pub mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod state;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use services::upload::{UploadCoordinator, UploadSettings};
pub use task_handlers::{TaskHandler, TranscodeTaskHandler};
pub use transfat_worker::{TaskQueue, TaskQueueConfig};
