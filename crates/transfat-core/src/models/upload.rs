use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of the byte transfer for one upload session.
///
/// COMPLETED, CANCELLED and FAILED are terminal. COMPLETED and CANCELLED
/// absorb; FAILED only leaves through a retried completion, since the store
/// upload stays open until the object is assembled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Created,
    Uploading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 6] = [
        UploadStatus::Created,
        UploadStatus::Uploading,
        UploadStatus::Paused,
        UploadStatus::Completed,
        UploadStatus::Cancelled,
        UploadStatus::Failed,
    ];

    /// States a client status update may start from. CREATED is included so
    /// a client can pause or cancel before requesting its first part URL.
    pub const ACTIVE: [UploadStatus; 3] = [
        UploadStatus::Created,
        UploadStatus::Uploading,
        UploadStatus::Paused,
    ];

    /// States a completion may start from.
    pub const COMPLETABLE: [UploadStatus; 4] = [
        UploadStatus::Created,
        UploadStatus::Uploading,
        UploadStatus::Paused,
        UploadStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Created => "CREATED",
            UploadStatus::Uploading => "UPLOADING",
            UploadStatus::Paused => "PAUSED",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Cancelled => "CANCELLED",
            UploadStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Cancelled | UploadStatus::Failed
        )
    }

    /// The single transition table for upload status.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match self {
            Created => matches!(next, Uploading | Paused | Cancelled | Failed | Completed),
            Uploading => matches!(next, Paused | Cancelled | Failed | Completed),
            Paused => matches!(next, Uploading | Cancelled | Failed | Completed),
            Failed => next == Completed,
            Completed | Cancelled => false,
        }
    }

    /// Targets a client may request through a status update. COMPLETED is
    /// only reachable through the completion flow.
    pub fn is_client_settable(&self) -> bool {
        matches!(
            self,
            UploadStatus::Uploading
                | UploadStatus::Paused
                | UploadStatus::Cancelled
                | UploadStatus::Failed
        )
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(UploadStatus::Created),
            "UPLOADING" => Ok(UploadStatus::Uploading),
            "PAUSED" => Ok(UploadStatus::Paused),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "CANCELLED" => Ok(UploadStatus::Cancelled),
            "FAILED" => Ok(UploadStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// Lifecycle of the HLS conversion, independent of the transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscodeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeStatus::Pending => "PENDING",
            TranscodeStatus::Processing => "PROCESSING",
            TranscodeStatus::Completed => "COMPLETED",
            TranscodeStatus::Failed => "FAILED",
        }
    }

    /// PROCESSING -> PROCESSING covers a retry after a crashed attempt.
    /// FAILED -> PROCESSING covers a retried or requeued job.
    pub fn can_transition_to(&self, next: TranscodeStatus) -> bool {
        use TranscodeStatus::*;
        match self {
            Pending => next == Processing,
            Processing => matches!(next, Processing | Completed | Failed),
            Failed => next == Processing,
            Completed => false,
        }
    }

    /// Every status that may legally move to `next`.
    pub fn sources_of(next: TranscodeStatus) -> Vec<TranscodeStatus> {
        [
            TranscodeStatus::Pending,
            TranscodeStatus::Processing,
            TranscodeStatus::Completed,
            TranscodeStatus::Failed,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(next))
        .collect()
    }
}

impl Display for TranscodeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TranscodeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TranscodeStatus::Pending),
            "PROCESSING" => Ok(TranscodeStatus::Processing),
            "COMPLETED" => Ok(TranscodeStatus::Completed),
            "FAILED" => Ok(TranscodeStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid transcode status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// The `videoUploadId` handed to clients and carried by transcode jobs.
    pub id: Uuid,
    /// Multipart upload id issued by the object store.
    pub upload_id: String,
    pub user_id: Uuid,
    pub key: String,
    pub bucket: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub chunk_size: i64,
    pub status: UploadStatus,
    pub transcode_status: TranscodeStatus,
    pub hls_master_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcoded_at: Option<DateTime<Utc>>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for UploadSession {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UploadSession {
            id: row.get("id"),
            upload_id: row.get("upload_id"),
            user_id: row.get("user_id"),
            key: row.get("key"),
            bucket: row.get("bucket"),
            file_name: row.get("file_name"),
            content_type: row.get("content_type"),
            size: row.get("size"),
            chunk_size: row.get("chunk_size"),
            status: row.get::<String, _>("status").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            transcode_status: row
                .get::<String, _>("transcode_status")
                .parse()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse transcode_status: {}", e).into())
                })?,
            hls_master_key: row.get("hls_master_key"),
            thumbnail_key: row.get("thumbnail_key"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            transcoded_at: row.get("transcoded_at"),
        })
    }
}

impl UploadSession {
    pub fn part_plan(&self) -> super::PartPlan {
        super::PartPlan::new(self.size as u64, self.chunk_size as u64)
    }

    pub fn part_count(&self) -> u32 {
        self.part_plan().part_count()
    }
}

/// Values needed to insert a fresh session. Status columns take their initial
/// values (CREATED / PENDING) at insert time.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    pub upload_id: String,
    pub user_id: Uuid,
    pub key: String,
    pub bucket: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub chunk_size: i64,
}

/// One stored part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartETag {
    pub part_number: i32,
    #[serde(rename = "eTag")]
    pub e_tag: String,
}
