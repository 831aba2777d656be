//! Transfat Storage Library
//!
//! Object store abstraction plus S3 and local filesystem implementations.
//!
//! # Key layout
//!
//! - Source uploads: `videos/{user_id}/{timestamp_millis}-{short_id}/{file_name}`
//! - HLS output: `videos/{video_upload_id}/hls/{file}`
//! - Thumbnails: `videos/{video_upload_id}/thumbnail.jpg`
//!
//! Keys must not contain `..` segments or a leading `/`. Key construction is
//! centralized in the `keys` module.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use factory::create_object_store;
#[cfg(feature = "storage-local")]
pub use local::LocalObjectStore;
#[cfg(feature = "storage-s3")]
pub use s3::S3ObjectStore;
pub use transfat_core::StorageBackend;
pub use traits::{ByteStream, ObjectStore, PresignedUrl, StorageError, StorageResult, StoredPart};
