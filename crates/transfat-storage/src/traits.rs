//! Object store abstraction
//!
//! The upload coordinator and the transcode pipeline talk to storage only
//! through [`ObjectStore`]. Multipart primitives map one-to-one onto the S3
//! API; the local backend emulates them on disk.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use transfat_core::models::PartETag;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Multipart upload not found: {0}")]
    UploadNotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("Signed URL has expired")]
    Expired,

    #[error("Signed URL signature is invalid")]
    InvalidSignature,

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// A part the store has accepted for an in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPart {
    pub part_number: i32,
    pub e_tag: String,
    pub size: u64,
}

/// A time-limited URL that grants one operation without other credentials.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl PresignedUrl {
    pub(crate) fn new(url: String, expires_in: Duration) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::zero());
        Self { url, expires_at }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn backend_type(&self) -> StorageBackend;

    /// Bucket (or root namespace) that keys are resolved against.
    fn bucket(&self) -> &str;

    /// Open a multipart upload at `key`; returns the store-issued upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str)
        -> StorageResult<String>;

    /// URL that accepts an HTTP PUT of one part's bytes. The response to that
    /// PUT carries the part's ETag header.
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl>;

    /// Parts stored so far, ordered by part number.
    async fn list_parts(&self, key: &str, upload_id: &str) -> StorageResult<Vec<StoredPart>>;

    /// Assemble the final object from `parts`, which must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> StorageResult<()>;

    /// Discard an in-progress multipart upload and its parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Stream an object's bytes.
    async fn get_object(&self, key: &str) -> StorageResult<ByteStream>;

    /// Whether an object is stored at `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Time-limited GET URL for a stored object.
    async fn presign_get_url(&self, key: &str, expires_in: Duration)
        -> StorageResult<PresignedUrl>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;
}
