//! Limits and defaults shared by the server and the upload client.

/// Default chunk size: every part is this size except the last.
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Smallest non-final part accepted by S3-compatible multipart uploads.
pub const MIN_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Multipart uploads are capped at this many parts.
pub const MAX_PART_COUNT: u32 = 10_000;

/// Hard ceiling on a single upload (5 GiB).
pub const DEFAULT_MAX_UPLOAD_SIZE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Content types must start with this prefix to be accepted.
pub const DEFAULT_ALLOWED_CONTENT_TYPE_PREFIX: &str = "video/";

/// Signed part upload URLs are short-lived.
pub const DEFAULT_PART_URL_EXPIRY_SECS: u64 = 60 * 60;

/// Signed manifest URLs last a day.
pub const DEFAULT_MANIFEST_URL_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Retry budget for a transcode job.
pub const TRANSCODE_MAX_ATTEMPTS: i32 = 3;

/// Maximum length of a sanitised file name.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Listing defaults.
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Timeout assumed for running tasks that carry none when reaping.
pub const STALE_TASK_FALLBACK_TIMEOUT_SECS: i64 = 60 * 60;

/// Channel used by LISTEN/NOTIFY to wake idle workers.
pub const NEW_TASK_CHANNEL: &str = "transfat_new_task";
