//! Client error types.

use thiserror::Error;

/// Why a single part PUT failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The signed URL is past its expiry. Ask for a fresh one.
    #[error("Signed URL expired")]
    Expired,

    /// The store refused the request for a reason other than expiry.
    #[error("Part upload rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Network failure or a retryable status (5xx, 408, 429).
    #[error("Transient transfer failure: {0}")]
    Transient(String),

    /// The store accepted the bytes but sent no ETag back.
    #[error("Part upload response carried no ETag")]
    MissingETag,
}

impl TransferError {
    /// Worth another attempt with a freshly signed URL.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransferError::MissingETag)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload cancelled")]
    Cancelled,

    #[error("Part {part_number} failed: {source}")]
    Transfer {
        part_number: u32,
        #[source]
        source: TransferError,
    },

    /// The coordinator API answered with an error or could not be reached.
    #[error("API error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn api(message: impl Into<String>) -> Self {
        UploadError::Api {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// The coordinator's part list disagreed with what the store holds.
    pub fn is_part_mismatch(&self) -> bool {
        matches!(self, UploadError::Api { code: Some(code), .. } if code == "PART_MISMATCH")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status() {
        let err = UploadError::Api {
            status: Some(409),
            code: Some("STATE_CONFLICT".to_string()),
            message: "Upload already COMPLETED".to_string(),
        };
        assert_eq!(err.to_string(), "API error (409): Upload already COMPLETED");
        assert_eq!(
            UploadError::api("connection refused").to_string(),
            "API error: connection refused"
        );
    }

    #[test]
    fn part_mismatch_is_recognised_by_code() {
        let mismatch = UploadError::Api {
            status: Some(400),
            code: Some("PART_MISMATCH".to_string()),
            message: "Submitted 2 parts but storage holds 3; missing parts [3]".to_string(),
        };
        assert!(mismatch.is_part_mismatch());
        assert!(!UploadError::api("PART_MISMATCH").is_part_mismatch());
    }

    #[test]
    fn missing_etag_is_not_retryable() {
        assert!(TransferError::Expired.is_retryable());
        assert!(TransferError::Transient("reset".into()).is_retryable());
        assert!(!TransferError::MissingETag.is_retryable());
    }
}
