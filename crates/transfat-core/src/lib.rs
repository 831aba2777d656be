//! Transfat Core Library
//!
//! This crate provides the domain models, error taxonomy, and configuration
//! shared by every Transfat component: the API server, the transcode worker
//! and the upload client.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

// Re-export commonly used types
pub use config::{BaseConfig, Config, MetadataBackend, TransfatConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
