//! API constants

/// Prefix of every versioned route.
pub const API_PREFIX: &str = "/api/v0";

/// Prefix of the signed-URL routes served for the local storage backend.
/// Lives outside the versioned API because the URLs are minted by storage.
pub const STORAGE_PREFIX: &str = "/storage";

/// Upper bound on a request body outside the part upload route.
pub const JSON_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;
