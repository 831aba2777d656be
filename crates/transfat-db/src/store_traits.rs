//! Store abstractions
//!
//! The coordinator, the transcode pipeline and the task queue only see these
//! traits, so they run unchanged against Postgres or the in-memory stores.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use transfat_core::models::{
    NewTask, NewUploadSession, Task, TranscodeStatus, UploadSession, UploadStatus,
};
use transfat_core::AppError;
use uuid::Uuid;

#[async_trait]
pub trait UploadSessionStore: Send + Sync {
    /// Insert a session with status CREATED and transcode status PENDING.
    async fn create(&self, new: NewUploadSession) -> Result<UploadSession, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadSession>, AppError>;

    async fn find_by_id_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<UploadSession>, AppError>;

    /// Look up by the store-issued multipart upload id, scoped to its owner.
    async fn find_by_upload_id_for_user(
        &self,
        user_id: Uuid,
        upload_id: &str,
    ) -> Result<Option<UploadSession>, AppError>;

    /// Compare-and-set on `status`. Returns `None` when the current status is
    /// not in `expected` (or the row is gone); the row is left untouched.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[UploadStatus],
        next: UploadStatus,
    ) -> Result<Option<UploadSession>, AppError>;

    /// Compare-and-set on `transcode_status`.
    async fn transition_transcode_status(
        &self,
        id: Uuid,
        expected: &[TranscodeStatus],
        next: TranscodeStatus,
    ) -> Result<Option<UploadSession>, AppError>;

    /// Record published output and move PROCESSING -> COMPLETED in one write.
    async fn finalize_transcode(
        &self,
        id: Uuid,
        hls_master_key: &str,
        thumbnail_key: Option<&str>,
    ) -> Result<Option<UploadSession>, AppError>;

    /// One page of a user's sessions, newest first, plus the total count.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<UploadSession>, u64), AppError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task. When `dedupe_key` matches an existing row, that row is
    /// returned instead and nothing is inserted.
    async fn create_task(&self, new: NewTask) -> Result<Task>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>>;

    /// Atomically move the oldest due waiting task to `running`.
    async fn claim_next_task(&self) -> Result<Option<Task>>;

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task>;

    async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task>;

    /// Count the failed attempt and make the task claimable again after
    /// `delay_secs`.
    async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: i64,
        error: serde_json::Value,
    ) -> Result<Task>;

    /// Recover tasks whose worker died: `running` rows older than their
    /// timeout plus `grace_period_secs` count as a failed attempt. Returns
    /// the number of rows touched.
    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64>;

    /// Put a `failed` task back to `pending` with a fresh attempt budget.
    /// Returns `None` if the task is not in `failed`.
    async fn requeue_failed(&self, task_id: Uuid) -> Result<Option<Task>>;

    /// In-process wakeup for stores that cannot use LISTEN/NOTIFY.
    fn wakeup(&self) -> Option<Arc<Notify>> {
        None
    }
}
