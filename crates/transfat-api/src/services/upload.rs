//! Upload coordinator
//!
//! Server-side authority over upload session status. Every status write is a
//! compare-and-set against the store, so concurrent `complete` and
//! `update_status` calls on one session cannot both win.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use transfat_core::constants::{MAX_PART_COUNT, TRANSCODE_MAX_ATTEMPTS};
use transfat_core::models::{
    EnqueueOptions, InitiateUploadRequest, ListUploadsQuery, ManifestResponse, NewUploadSession,
    PaginationMeta, PartETag, PartPlan, TranscodePayload, UploadSession, UploadStatus,
};
use transfat_core::{AppError, Config};
use transfat_db::UploadSessionStore;
use transfat_storage::keys::{sanitize_file_name, upload_key};
use transfat_storage::{ObjectStore, PresignedUrl, StorageError};
use transfat_worker::TaskQueue;
use uuid::Uuid;
use validator::Validate;

use crate::error::storage_error;

/// Upload limits and URL lifetimes.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_upload_size_bytes: u64,
    pub chunk_size_bytes: u64,
    pub allowed_content_type_prefix: String,
    pub part_url_expiry: Duration,
    pub manifest_url_expiry: Duration,
    pub transcode_max_attempts: i32,
}

impl UploadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_size_bytes: config.max_upload_size_bytes(),
            chunk_size_bytes: config.chunk_size_bytes(),
            allowed_content_type_prefix: config.allowed_content_type_prefix().to_string(),
            part_url_expiry: Duration::from_secs(config.part_url_expiry_secs()),
            manifest_url_expiry: Duration::from_secs(config.manifest_url_expiry_secs()),
            transcode_max_attempts: TRANSCODE_MAX_ATTEMPTS,
        }
    }
}

pub struct UploadCoordinator {
    sessions: Arc<dyn UploadSessionStore>,
    storage: Arc<dyn ObjectStore>,
    queue: TaskQueue,
    settings: UploadSettings,
}

impl UploadCoordinator {
    pub fn new(
        sessions: Arc<dyn UploadSessionStore>,
        storage: Arc<dyn ObjectStore>,
        queue: TaskQueue,
        settings: UploadSettings,
    ) -> Self {
        Self {
            sessions,
            storage,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    async fn owned_session(
        &self,
        user_id: Uuid,
        upload_id: &str,
    ) -> Result<UploadSession, AppError> {
        self.sessions
            .find_by_upload_id_for_user(user_id, upload_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No video upload with uploadId {} found for this user",
                    upload_id
                ))
            })
    }

    /// Validate the request, open a multipart upload and persist a CREATED session.
    #[tracing::instrument(skip(self, request), fields(file_size = request.file_size))]
    pub async fn initiate(
        &self,
        user_id: Uuid,
        request: InitiateUploadRequest,
    ) -> Result<UploadSession, AppError> {
        request.validate()?;

        if request.file_size > self.settings.max_upload_size_bytes {
            return Err(AppError::InvalidInput(format!(
                "fileSize {} exceeds the maximum upload size of {} bytes",
                request.file_size, self.settings.max_upload_size_bytes
            )));
        }

        let content_type = request.content_type.trim().to_ascii_lowercase();
        if !content_type.starts_with(&self.settings.allowed_content_type_prefix) {
            return Err(AppError::InvalidInput(format!(
                "contentType must start with '{}'",
                self.settings.allowed_content_type_prefix
            )));
        }

        let file_name = sanitize_file_name(&request.file_name);
        if file_name.is_empty() {
            return Err(AppError::InvalidInput(
                "fileName contains no usable characters".to_string(),
            ));
        }

        let plan = PartPlan::new(request.file_size, self.settings.chunk_size_bytes);
        if plan.part_count() > MAX_PART_COUNT {
            return Err(AppError::InvalidInput(format!(
                "Upload would need {} parts; the limit is {}",
                plan.part_count(),
                MAX_PART_COUNT
            )));
        }

        let key = upload_key(user_id, Utc::now().timestamp_millis(), &file_name);
        let upload_id = self
            .storage
            .create_multipart_upload(&key, &content_type)
            .await
            .map_err(storage_error)?;

        let new = NewUploadSession {
            upload_id: upload_id.clone(),
            user_id,
            key: key.clone(),
            bucket: self.storage.bucket().to_string(),
            file_name,
            content_type,
            size: plan.size() as i64,
            chunk_size: plan.chunk_size() as i64,
        };

        let session = match self.sessions.create(new).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(abort_err) = self.storage.abort_multipart_upload(&key, &upload_id).await
                {
                    tracing::warn!(
                        error = %abort_err,
                        upload_id = %upload_id,
                        "Failed to abort multipart upload after session insert failed"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            video_upload_id = %session.id,
            upload_id = %session.upload_id,
            key = %session.key,
            part_count = plan.part_count(),
            "Upload session created"
        );

        Ok(session)
    }

    /// Presign a PUT for one part. The first URL moves CREATED to UPLOADING.
    #[tracing::instrument(skip(self))]
    pub async fn issue_part_url(
        &self,
        user_id: Uuid,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PresignedUrl, AppError> {
        let session = self.owned_session(user_id, upload_id).await?;

        let part_count = session.part_count();
        if !session.part_plan().contains(part_number) {
            return Err(AppError::InvalidInput(format!(
                "partNumber must be between 1 and {}",
                part_count
            )));
        }

        if session.status.is_terminal() {
            return Err(AppError::StateConflict(format!(
                "Upload already {}",
                session.status
            )));
        }

        let url = self
            .storage
            .presign_upload_part(
                &session.key,
                &session.upload_id,
                part_number as i32,
                self.settings.part_url_expiry,
            )
            .await
            .map_err(storage_error)?;

        if session.status == UploadStatus::Created {
            // Losing this race to another part request or a pause is fine.
            self.sessions
                .transition_status(session.id, &[UploadStatus::Created], UploadStatus::Uploading)
                .await?;
        }

        Ok(url)
    }

    /// Verify the submitted parts against the store, assemble the object,
    /// mark the session COMPLETED and enqueue its transcode.
    ///
    /// Safe to retry after a partial failure: an object the store already
    /// assembled is accepted, and a COMPLETED session has its transcode
    /// enqueued again (absorbed by the dedupe key) before the conflict is
    /// returned.
    #[tracing::instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn complete(
        &self,
        user_id: Uuid,
        upload_id: &str,
        parts: Vec<PartETag>,
    ) -> Result<UploadSession, AppError> {
        let session = self.owned_session(user_id, upload_id).await?;

        match session.status {
            UploadStatus::Completed => {
                self.enqueue_transcode(&session).await?;
                return Err(AppError::StateConflict(
                    "Upload already COMPLETED".to_string(),
                ));
            }
            UploadStatus::Cancelled => {
                return Err(AppError::StateConflict(
                    "Upload already CANCELLED".to_string(),
                ));
            }
            _ => {}
        }

        match self
            .storage
            .list_parts(&session.key, &session.upload_id)
            .await
        {
            Ok(stored) => {
                let stored_numbers: BTreeSet<i32> =
                    stored.iter().map(|p| p.part_number).collect();
                check_part_sets(&parts, &stored_numbers)?;

                let mut parts = parts;
                parts.sort_by_key(|p| p.part_number);
                for part in &mut parts {
                    part.e_tag = part.e_tag.trim_matches('"').to_string();
                }

                match self
                    .storage
                    .complete_multipart_upload(&session.key, &session.upload_id, &parts)
                    .await
                {
                    Ok(()) => {}
                    Err(StorageError::UploadNotFound(_)) => {
                        self.ensure_assembled(&session).await?
                    }
                    Err(e) => return Err(storage_error(e)),
                }
            }
            Err(StorageError::UploadNotFound(_)) => self.ensure_assembled(&session).await?,
            Err(e) => return Err(storage_error(e)),
        }

        let completed = self
            .sessions
            .transition_status(
                session.id,
                &UploadStatus::COMPLETABLE,
                UploadStatus::Completed,
            )
            .await?
            .ok_or_else(|| {
                AppError::StateConflict("Upload changed status during completion".to_string())
            })?;

        let task_id = self.enqueue_transcode(&completed).await?;

        tracing::info!(
            video_upload_id = %completed.id,
            upload_id = %completed.upload_id,
            task_id = %task_id,
            "Upload completed, transcode enqueued"
        );

        Ok(completed)
    }

    /// The store no longer knows the multipart upload. Either an earlier
    /// `complete` assembled it and stopped before its status write, or a
    /// cancel or concurrent completion got there first.
    async fn ensure_assembled(&self, session: &UploadSession) -> Result<(), AppError> {
        let current = self
            .sessions
            .find_by_id(session.id)
            .await?
            .map(|s| s.status)
            .unwrap_or(session.status);
        if matches!(current, UploadStatus::Completed | UploadStatus::Cancelled) {
            return Err(AppError::StateConflict(format!(
                "Upload already {}",
                current
            )));
        }

        if self
            .storage
            .exists(&session.key)
            .await
            .map_err(storage_error)?
        {
            tracing::warn!(
                video_upload_id = %session.id,
                key = %session.key,
                "Object already assembled by an earlier completion, finishing it"
            );
            Ok(())
        } else {
            Err(AppError::Storage(
                "Multipart upload is missing from storage".to_string(),
            ))
        }
    }

    /// One transcode task per video; a repeat enqueue returns the existing task.
    async fn enqueue_transcode(&self, session: &UploadSession) -> Result<Uuid, AppError> {
        let payload = TranscodePayload {
            video_upload_id: session.id,
        };
        let options = EnqueueOptions {
            max_attempts: Some(self.settings.transcode_max_attempts),
            ..Default::default()
        };
        let task = self.queue.enqueue(&payload, options).await.map_err(|e| {
            tracing::error!(
                error = %e,
                video_upload_id = %session.id,
                "Transcode enqueue failed"
            );
            AppError::from(e)
        })?;
        Ok(task.id)
    }

    /// Client-driven pause, resume, cancel or failure report.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        user_id: Uuid,
        upload_id: &str,
        next: UploadStatus,
    ) -> Result<UploadSession, AppError> {
        if !next.is_client_settable() {
            return Err(AppError::InvalidInput(format!(
                "status must be one of UPLOADING, PAUSED, CANCELLED, FAILED (got {})",
                next
            )));
        }

        let session = self.owned_session(user_id, upload_id).await?;
        if !session.status.can_transition_to(next) {
            return Err(AppError::StateConflict(format!(
                "Cannot move upload from {} to {}",
                session.status, next
            )));
        }

        let expected: Vec<UploadStatus> = UploadStatus::ACTIVE
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect();
        let updated = match self
            .sessions
            .transition_status(session.id, &expected, next)
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = self
                    .sessions
                    .find_by_id(session.id)
                    .await?
                    .map(|s| s.status.to_string())
                    .unwrap_or_else(|| "deleted".to_string());
                return Err(AppError::StateConflict(format!(
                    "Cannot move upload from {} to {}",
                    current, next
                )));
            }
        };

        if next == UploadStatus::Cancelled {
            if let Err(e) = self
                .storage
                .abort_multipart_upload(&updated.key, &updated.upload_id)
                .await
            {
                tracing::warn!(
                    error = %e,
                    upload_id = %updated.upload_id,
                    "Failed to abort multipart upload for cancelled session"
                );
            }
        }

        tracing::info!(
            video_upload_id = %updated.id,
            from = %session.status,
            to = %updated.status,
            "Upload status updated"
        );

        Ok(updated)
    }

    /// One page of the caller's uploads, newest first.
    pub async fn list_uploads(
        &self,
        user_id: Uuid,
        query: ListUploadsQuery,
    ) -> Result<(Vec<UploadSession>, PaginationMeta), AppError> {
        query.validate()?;
        let page = query.page.unwrap_or(transfat_core::constants::DEFAULT_PAGE);
        let per_page = query
            .per_page
            .unwrap_or(transfat_core::constants::DEFAULT_PER_PAGE);
        let offset = (page as u64 - 1) * per_page as u64;

        let (data, total) = self
            .sessions
            .list_for_user(user_id, offset, per_page)
            .await?;

        Ok((data, PaginationMeta::new(page, per_page, total)))
    }

    /// Signed URL for the HLS master playlist, once the transcode published one.
    #[tracing::instrument(skip(self))]
    pub async fn get_manifest(
        &self,
        user_id: Uuid,
        video_upload_id: Uuid,
    ) -> Result<ManifestResponse, AppError> {
        let session = self
            .sessions
            .find_by_id_for_user(user_id, video_upload_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No video upload with id {} found for this user",
                    video_upload_id
                ))
            })?;

        let Some(master_key) = session.hls_master_key.as_deref() else {
            return Err(AppError::NotFound("Video is still processing".to_string()));
        };

        let expiry = self.settings.manifest_url_expiry;
        let manifest = self
            .storage
            .presign_get_url(master_key, expiry)
            .await
            .map_err(storage_error)?;

        let thumbnail_url = match session.thumbnail_key.as_deref() {
            Some(key) => Some(
                self.storage
                    .presign_get_url(key, expiry)
                    .await
                    .map_err(storage_error)?
                    .url,
            ),
            None => None,
        };

        Ok(ManifestResponse {
            url: manifest.url,
            expires_at: manifest.expires_at,
            thumbnail_url,
        })
    }
}

/// Submitted part numbers must be unique and equal, as a set, to what the
/// store holds.
fn check_part_sets(submitted: &[PartETag], stored: &BTreeSet<i32>) -> Result<(), AppError> {
    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<i32> = submitted
        .iter()
        .filter(|p| !seen.insert(p.part_number))
        .map(|p| p.part_number)
        .collect();
    if !duplicates.is_empty() {
        return Err(AppError::Integrity {
            message: format!("Duplicate part numbers submitted: {:?}", duplicates),
            missing_parts: Vec::new(),
            unexpected_parts: duplicates.into_iter().collect(),
        });
    }

    let missing: Vec<i32> = stored.difference(&seen).copied().collect();
    let unexpected: Vec<i32> = seen.difference(stored).copied().collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(AppError::Integrity {
            message: format!(
                "Submitted {} parts but storage holds {}",
                seen.len(),
                stored.len()
            ),
            missing_parts: missing,
            unexpected_parts: unexpected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Notify;
    use transfat_core::models::{NewTask, Task, TranscodeStatus};
    use transfat_db::{MemoryTaskStore, MemoryUploadSessionStore, TaskStore};
    use transfat_storage::LocalObjectStore;
    use transfat_worker::TaskQueueConfig;

    /// Task store whose next insert fails once when armed.
    struct FlakyTaskStore {
        inner: MemoryTaskStore,
        fail_next_create: AtomicBool,
    }

    #[async_trait]
    impl TaskStore for FlakyTaskStore {
        async fn create_task(&self, new: NewTask) -> anyhow::Result<Task> {
            if self.fail_next_create.swap(false, Ordering::SeqCst) {
                anyhow::bail!("task table unavailable");
            }
            self.inner.create_task(new).await
        }

        async fn get_task(&self, task_id: Uuid) -> anyhow::Result<Option<Task>> {
            self.inner.get_task(task_id).await
        }

        async fn claim_next_task(&self) -> anyhow::Result<Option<Task>> {
            self.inner.claim_next_task().await
        }

        async fn mark_completed(
            &self,
            task_id: Uuid,
            result: serde_json::Value,
        ) -> anyhow::Result<Task> {
            self.inner.mark_completed(task_id, result).await
        }

        async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> anyhow::Result<Task> {
            self.inner.mark_failed(task_id, error).await
        }

        async fn schedule_retry(
            &self,
            task_id: Uuid,
            delay_secs: i64,
            error: serde_json::Value,
        ) -> anyhow::Result<Task> {
            self.inner.schedule_retry(task_id, delay_secs, error).await
        }

        async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> anyhow::Result<u64> {
            self.inner.reap_stale_running_tasks(grace_period_secs).await
        }

        async fn requeue_failed(&self, task_id: Uuid) -> anyhow::Result<Option<Task>> {
            self.inner.requeue_failed(task_id).await
        }

        fn wakeup(&self) -> Option<Arc<Notify>> {
            self.inner.wakeup()
        }
    }

    /// Session store whose next move to COMPLETED fails once when armed.
    struct FlakySessionStore {
        inner: MemoryUploadSessionStore,
        fail_next_completion: AtomicBool,
    }

    #[async_trait]
    impl UploadSessionStore for FlakySessionStore {
        async fn create(&self, new: NewUploadSession) -> Result<UploadSession, AppError> {
            self.inner.create(new).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_id_for_user(
            &self,
            user_id: Uuid,
            id: Uuid,
        ) -> Result<Option<UploadSession>, AppError> {
            self.inner.find_by_id_for_user(user_id, id).await
        }

        async fn find_by_upload_id_for_user(
            &self,
            user_id: Uuid,
            upload_id: &str,
        ) -> Result<Option<UploadSession>, AppError> {
            self.inner.find_by_upload_id_for_user(user_id, upload_id).await
        }

        async fn transition_status(
            &self,
            id: Uuid,
            expected: &[UploadStatus],
            next: UploadStatus,
        ) -> Result<Option<UploadSession>, AppError> {
            if next == UploadStatus::Completed
                && self.fail_next_completion.swap(false, Ordering::SeqCst)
            {
                return Err(AppError::Internal("connection reset".to_string()));
            }
            self.inner.transition_status(id, expected, next).await
        }

        async fn transition_transcode_status(
            &self,
            id: Uuid,
            expected: &[TranscodeStatus],
            next: TranscodeStatus,
        ) -> Result<Option<UploadSession>, AppError> {
            self.inner.transition_transcode_status(id, expected, next).await
        }

        async fn finalize_transcode(
            &self,
            id: Uuid,
            hls_master_key: &str,
            thumbnail_key: Option<&str>,
        ) -> Result<Option<UploadSession>, AppError> {
            self.inner
                .finalize_transcode(id, hls_master_key, thumbnail_key)
                .await
        }

        async fn list_for_user(
            &self,
            user_id: Uuid,
            offset: u64,
            limit: u32,
        ) -> Result<(Vec<UploadSession>, u64), AppError> {
            self.inner.list_for_user(user_id, offset, limit).await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        coordinator: UploadCoordinator,
        storage: Arc<LocalObjectStore>,
        sessions: Arc<FlakySessionStore>,
        tasks: Arc<FlakyTaskStore>,
        user_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            LocalObjectStore::new(dir.path(), "http://localhost:3000".to_string(), "secret")
                .await
                .unwrap(),
        );
        let sessions = Arc::new(FlakySessionStore {
            inner: MemoryUploadSessionStore::new(),
            fail_next_completion: AtomicBool::new(false),
        });
        let tasks = Arc::new(FlakyTaskStore {
            inner: MemoryTaskStore::new(),
            fail_next_create: AtomicBool::new(false),
        });
        let queue = TaskQueue::new(tasks.clone(), TaskQueueConfig::default());
        let settings = UploadSettings {
            max_upload_size_bytes: 1024,
            chunk_size_bytes: 4,
            allowed_content_type_prefix: "video/".to_string(),
            part_url_expiry: Duration::from_secs(60),
            manifest_url_expiry: Duration::from_secs(60),
            transcode_max_attempts: 3,
        };
        let coordinator =
            UploadCoordinator::new(sessions.clone(), storage.clone(), queue, settings);
        Fixture {
            _dir: dir,
            coordinator,
            storage,
            sessions,
            tasks,
            user_id: Uuid::new_v4(),
        }
    }

    /// Open an 8-byte upload and store both of its parts.
    async fn uploaded_session(f: &Fixture) -> (UploadSession, Vec<PartETag>) {
        let session = f
            .coordinator
            .initiate(
                f.user_id,
                InitiateUploadRequest {
                    file_name: "clip.mp4".to_string(),
                    file_size: 8,
                    content_type: "video/mp4".to_string(),
                },
            )
            .await
            .unwrap();
        let mut parts = Vec::new();
        for (n, chunk) in [(1, "abcd"), (2, "efgh")] {
            let e_tag = f
                .storage
                .write_part(&session.key, &session.upload_id, n, Bytes::from(chunk))
                .await
                .unwrap();
            parts.push(PartETag {
                part_number: n,
                e_tag,
            });
        }
        (session, parts)
    }

    #[tokio::test]
    async fn retried_complete_enqueues_the_missing_transcode() {
        let f = fixture().await;
        let (session, parts) = uploaded_session(&f).await;

        f.tasks.fail_next_create.store(true, Ordering::SeqCst);
        assert!(f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts.clone())
            .await
            .is_err());

        let stored = f.sessions.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UploadStatus::Completed);
        assert!(f.tasks.inner.all_tasks().is_empty());

        let retry = f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts.clone())
            .await;
        assert!(matches!(retry, Err(AppError::StateConflict(_))));
        assert_eq!(f.tasks.inner.all_tasks().len(), 1);

        // A further retry reuses the deduplicated task.
        let _ = f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts)
            .await;
        assert_eq!(f.tasks.inner.all_tasks().len(), 1);
    }

    #[tokio::test]
    async fn retried_complete_accepts_an_already_assembled_object() {
        let f = fixture().await;
        let (session, parts) = uploaded_session(&f).await;

        f.sessions.fail_next_completion.store(true, Ordering::SeqCst);
        assert!(f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts.clone())
            .await
            .is_err());
        assert!(f.storage.exists(&session.key).await.unwrap());
        let stored = f.sessions.find_by_id(session.id).await.unwrap().unwrap();
        assert_ne!(stored.status, UploadStatus::Completed);

        let completed = f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts)
            .await
            .unwrap();
        assert_eq!(completed.status, UploadStatus::Completed);
        assert_eq!(f.tasks.inner.all_tasks().len(), 1);
    }

    #[tokio::test]
    async fn failed_upload_can_still_complete() {
        let f = fixture().await;
        let (session, parts) = uploaded_session(&f).await;
        f.coordinator
            .update_status(f.user_id, &session.upload_id, UploadStatus::Failed)
            .await
            .unwrap();

        let completed = f
            .coordinator
            .complete(f.user_id, &session.upload_id, parts)
            .await
            .unwrap();
        assert_eq!(completed.status, UploadStatus::Completed);
    }

    fn etag(n: i32) -> PartETag {
        PartETag {
            part_number: n,
            e_tag: format!("\"etag-{}\"", n),
        }
    }

    #[test]
    fn matching_sets_pass() {
        let stored: BTreeSet<i32> = [1, 2, 3].into_iter().collect();
        assert!(check_part_sets(&[etag(3), etag(1), etag(2)], &stored).is_ok());
    }

    #[test]
    fn missing_part_is_reported() {
        let stored: BTreeSet<i32> = [1, 2, 3].into_iter().collect();
        match check_part_sets(&[etag(1), etag(2)], &stored) {
            Err(AppError::Integrity {
                missing_parts,
                unexpected_parts,
                ..
            }) => {
                assert_eq!(missing_parts, vec![3]);
                assert!(unexpected_parts.is_empty());
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn unstored_submission_is_reported() {
        let stored: BTreeSet<i32> = [1, 2].into_iter().collect();
        match check_part_sets(&[etag(1), etag(2), etag(3)], &stored) {
            Err(AppError::Integrity {
                missing_parts,
                unexpected_parts,
                ..
            }) => {
                assert!(missing_parts.is_empty());
                assert_eq!(unexpected_parts, vec![3]);
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn duplicates_are_rejected_even_when_counts_match() {
        let stored: BTreeSet<i32> = [1, 2].into_iter().collect();
        assert!(matches!(
            check_part_sets(&[etag(1), etag(1)], &stored),
            Err(AppError::Integrity { .. })
        ));
    }
}
