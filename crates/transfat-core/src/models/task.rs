use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TranscodeVideo,
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskType::TranscodeVideo => write!(f, "transcode_video"),
        }
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcode_video" => Ok(TaskType::TranscodeVideo),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

/// Queue-side state of a job. `Pending` and `Scheduled` are both "waiting";
/// `Scheduled` means a retry with a backoff delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Scheduled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    /// Identical enqueues collapse onto the row carrying this key.
    pub dedupe_key: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.get("id"),
            task_type: row.get::<String, _>("task_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            status: row.get::<String, _>("status").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task status: {}", e).into())
            })?,
            payload: row.get("payload"),
            result: row.get("result"),
            dedupe_key: row.get("dedupe_key"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            timeout_seconds: row.get("timeout_seconds"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Task {
    pub fn is_ready_to_run(&self) -> bool {
        self.status.is_waiting() && self.scheduled_at <= Utc::now()
    }

    /// `max_retries` counts total attempts; `retry_count` counts finished
    /// attempts that failed.
    pub fn can_retry(&self) -> bool {
        self.retry_count + 1 < self.max_retries
    }

    /// 1-based number of the attempt currently running.
    pub fn attempt(&self) -> i32 {
        self.retry_count + 1
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn result_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        self.result
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Trait for type-safe task payloads
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_type() -> TaskType;

    /// Key that makes repeated enqueues of the same work idempotent.
    fn dedupe_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TranscodePayload {
    pub video_upload_id: Uuid,
}

impl TaskPayload for TranscodePayload {
    fn task_type() -> TaskType {
        TaskType::TranscodeVideo
    }

    fn dedupe_key(&self) -> Option<String> {
        Some(format!("transcode:{}", self.video_upload_id))
    }
}

/// Per-enqueue knobs.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Total attempts. Falls back to the queue default when `None`.
    pub max_attempts: Option<i32>,
    pub dedupe_key: Option<String>,
    pub timeout_seconds: Option<i32>,
    /// Delay before the first attempt becomes claimable.
    pub delay: Option<chrono::Duration>,
}

/// Row values for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub dedupe_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(retry_count: i32, max_retries: i32) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            task_type: TaskType::TranscodeVideo,
            status: TaskStatus::Running,
            payload: serde_json::json!({ "videoUploadId": Uuid::nil() }),
            result: None,
            dedupe_key: None,
            scheduled_at: now,
            started_at: Some(now),
            completed_at: None,
            retry_count,
            max_retries,
            timeout_seconds: Some(60),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn three_attempts_allow_two_retries() {
        assert!(task(0, 3).can_retry());
        assert!(task(1, 3).can_retry());
        assert!(!task(2, 3).can_retry());
        assert_eq!(task(2, 3).attempt(), 3);
    }

    #[test]
    fn transcode_payload_parses_and_dedupes() {
        let t = task(0, 3);
        let payload: TranscodePayload = t.try_payload_as().unwrap();
        assert_eq!(payload.video_upload_id, Uuid::nil());
        assert_eq!(
            payload.dedupe_key().unwrap(),
            format!("transcode:{}", Uuid::nil())
        );
        assert_eq!(TranscodePayload::task_type(), TaskType::TranscodeVideo);
    }

    #[test]
    fn status_and_type_strings() {
        assert_eq!(TaskType::TranscodeVideo.to_string(), "transcode_video");
        assert_eq!("scheduled".parse::<TaskStatus>().unwrap(), TaskStatus::Scheduled);
        assert!(TaskStatus::Scheduled.is_waiting());
        assert!(!TaskStatus::Running.is_waiting());
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }
}
