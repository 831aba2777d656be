//! Request and response bodies of the `/api/v0/uploads` surface.
//!
//! Shared by the server handlers and the upload client so both sides agree on
//! the camelCase wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{PartETag, UploadSession, UploadStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    #[validate(length(
        min = 1,
        max = 1024,
        message = "fileName must be between 1 and 1024 characters"
    ))]
    pub file_name: String,
    #[validate(range(min = 1, message = "fileSize must be at least 1 byte"))]
    pub file_size: u64,
    #[validate(length(
        min = 1,
        max = 255,
        message = "contentType must be between 1 and 255 characters"
    ))]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    pub video_upload_id: Uuid,
    pub upload_id: String,
    pub key: String,
    pub status: UploadStatus,
    pub chunk_size: u64,
    pub part_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlQuery {
    #[validate(length(min = 1, message = "uploadId is required"))]
    pub upload_id: String,
    #[validate(range(min = 1, max = 10000, message = "partNumber must be between 1 and 10000"))]
    pub part_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlResponse {
    pub url: String,
    pub part_number: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, message = "uploadId is required"))]
    pub upload_id: String,
    #[validate(length(min = 1, max = 10000, message = "parts must not be empty"))]
    pub parts: Vec<PartETag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub success: bool,
    pub video_upload_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, message = "uploadId is required"))]
    pub upload_id: String,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    pub message: String,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListUploadsQuery {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "perPage must be between 1 and 100"))]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginationMeta {
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(per_page.max(1) as u64);
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next_page: (page as u64) < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadListResponse {
    pub data: Vec<UploadSession>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_flags() {
        let meta = PaginationMeta::new(1, 10, 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next_page);
        assert!(!meta.has_prev_page);

        let last = PaginationMeta::new(3, 10, 25);
        assert!(!last.has_next_page);
        assert!(last.has_prev_page);

        let empty = PaginationMeta::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next_page);
    }

    #[test]
    fn initiate_request_uses_camel_case() {
        let req: InitiateUploadRequest = serde_json::from_value(serde_json::json!({
            "fileName": "clip.mp4",
            "fileSize": 12582912u64,
            "contentType": "video/mp4"
        }))
        .unwrap();
        assert_eq!(req.file_size, 12_582_912);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn zero_size_fails_validation() {
        let req = InitiateUploadRequest {
            file_name: "clip.mp4".to_string(),
            file_size: 0,
            content_type: "video/mp4".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn list_query_bounds() {
        let q = ListUploadsQuery {
            page: Some(0),
            per_page: None,
        };
        assert!(q.validate().is_err());
        let q = ListUploadsQuery {
            page: Some(2),
            per_page: Some(101),
        };
        assert!(q.validate().is_err());
        assert!(ListUploadsQuery::default().validate().is_ok());
    }
}
