//! In-process stores for single-node runs and tests.
//!
//! Every compare-and-set runs under one mutex, which gives the same
//! linearizable outcome as the conditional `UPDATE ... WHERE status = ANY`
//! statements in the Postgres repositories.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use transfat_core::constants::STALE_TASK_FALLBACK_TIMEOUT_SECS;
use transfat_core::models::{
    NewTask, NewUploadSession, Task, TaskStatus, TranscodeStatus, UploadSession, UploadStatus,
};
use transfat_core::AppError;

use crate::store_traits::{TaskStore, UploadSessionStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a half-written row behind,
    // so recovering the guard is safe.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryUploadSessionStore {
    sessions: Mutex<HashMap<Uuid, UploadSession>>,
}

impl MemoryUploadSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadSessionStore for MemoryUploadSessionStore {
    async fn create(&self, new: NewUploadSession) -> Result<UploadSession, AppError> {
        let mut sessions = lock(&self.sessions);
        if sessions.values().any(|s| s.upload_id == new.upload_id) {
            return Err(AppError::StateConflict(format!(
                "Upload id {} already registered",
                new.upload_id
            )));
        }

        let now = Utc::now();
        let session = UploadSession {
            id: Uuid::new_v4(),
            upload_id: new.upload_id,
            user_id: new.user_id,
            key: new.key,
            bucket: new.bucket,
            file_name: new.file_name,
            content_type: new.content_type,
            size: new.size,
            chunk_size: new.chunk_size,
            status: UploadStatus::Created,
            transcode_status: TranscodeStatus::Pending,
            hls_master_key: None,
            thumbnail_key: None,
            created_at: now,
            updated_at: now,
            transcoded_at: None,
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        Ok(lock(&self.sessions).get(&id).cloned())
    }

    async fn find_by_id_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<UploadSession>, AppError> {
        Ok(lock(&self.sessions)
            .get(&id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn find_by_upload_id_for_user(
        &self,
        user_id: Uuid,
        upload_id: &str,
    ) -> Result<Option<UploadSession>, AppError> {
        Ok(lock(&self.sessions)
            .values()
            .find(|s| s.user_id == user_id && s.upload_id == upload_id)
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[UploadStatus],
        next: UploadStatus,
    ) -> Result<Option<UploadSession>, AppError> {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&session.status) {
            return Ok(None);
        }
        session.status = next;
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn transition_transcode_status(
        &self,
        id: Uuid,
        expected: &[TranscodeStatus],
        next: TranscodeStatus,
    ) -> Result<Option<UploadSession>, AppError> {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&session.transcode_status) {
            return Ok(None);
        }
        session.transcode_status = next;
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn finalize_transcode(
        &self,
        id: Uuid,
        hls_master_key: &str,
        thumbnail_key: Option<&str>,
    ) -> Result<Option<UploadSession>, AppError> {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(&id) else {
            return Ok(None);
        };
        if session.transcode_status != TranscodeStatus::Processing {
            return Ok(None);
        }
        let now = Utc::now();
        session.transcode_status = TranscodeStatus::Completed;
        session.hls_master_key = Some(hls_master_key.to_string());
        session.thumbnail_key = thumbnail_key.map(String::from);
        session.transcoded_at = Some(now);
        session.updated_at = now;
        Ok(Some(session.clone()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<UploadSession>, u64), AppError> {
        let sessions = lock(&self.sessions);
        let mut owned: Vec<&UploadSession> =
            sessions.values().filter(|s| s.user_id == user_id).collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let total = owned.len() as u64;
        let page = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
    notify: Arc<Notify>,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every task, for inspection in tests and diagnostics.
    pub fn all_tasks(&self) -> Vec<Task> {
        lock(&self.tasks).values().cloned().collect()
    }

    fn update<F>(&self, task_id: Uuid, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = lock(&self.tasks);
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, new: NewTask) -> Result<Task> {
        let task = {
            let mut tasks = lock(&self.tasks);
            if let Some(key) = new.dedupe_key.as_deref() {
                if let Some(existing) = tasks
                    .values()
                    .find(|t| t.dedupe_key.as_deref() == Some(key))
                {
                    tracing::info!(
                        task_id = %existing.id,
                        dedupe_key = %key,
                        "Task already enqueued, returning existing row"
                    );
                    return Ok(existing.clone());
                }
            }

            let now = Utc::now();
            let status = if new.scheduled_at > now {
                TaskStatus::Scheduled
            } else {
                TaskStatus::Pending
            };
            let task = Task {
                id: Uuid::new_v4(),
                task_type: new.task_type,
                status,
                payload: new.payload,
                result: None,
                dedupe_key: new.dedupe_key,
                scheduled_at: new.scheduled_at,
                started_at: None,
                completed_at: None,
                retry_count: 0,
                max_retries: new.max_retries,
                timeout_seconds: new.timeout_seconds,
                created_at: now,
                updated_at: now,
            };
            tasks.insert(task.id, task.clone());
            task
        };

        self.notify.notify_one();
        tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task created");
        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(lock(&self.tasks).get(&task_id).cloned())
    }

    async fn claim_next_task(&self) -> Result<Option<Task>> {
        let mut tasks = lock(&self.tasks);
        let now = Utc::now();
        let next_id = tasks
            .values()
            .filter(|t| t.status.is_waiting() && t.scheduled_at <= now)
            .min_by(|a, b| {
                a.scheduled_at
                    .cmp(&b.scheduled_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|t| t.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(None);
        };
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        self.update(task_id, |task| {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        self.update(task_id, |task| {
            task.status = TaskStatus::Failed;
            task.result = Some(error);
            task.retry_count += 1;
            task.completed_at = Some(Utc::now());
        })
    }

    async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: i64,
        error: serde_json::Value,
    ) -> Result<Task> {
        let task = self.update(task_id, |task| {
            task.status = TaskStatus::Scheduled;
            task.result = Some(error);
            task.retry_count += 1;
            task.started_at = None;
            task.scheduled_at = Utc::now() + Duration::seconds(delay_secs);
        })?;
        self.notify.notify_one();
        Ok(task)
    }

    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        let now = Utc::now();
        let mut reaped = 0u64;
        {
            let mut tasks = lock(&self.tasks);
            for task in tasks.values_mut() {
                if task.status != TaskStatus::Running {
                    continue;
                }
                let Some(started_at) = task.started_at else {
                    continue;
                };
                let timeout = task
                    .timeout_seconds
                    .map(i64::from)
                    .unwrap_or(STALE_TASK_FALLBACK_TIMEOUT_SECS);
                if started_at >= now - Duration::seconds(timeout + grace_period_secs) {
                    continue;
                }

                let exhausted = task.retry_count + 1 >= task.max_retries;
                task.retry_count += 1;
                task.status = if exhausted {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Pending
                };
                task.result = Some(serde_json::json!({ "error": "worker stopped responding" }));
                task.completed_at = exhausted.then_some(now);
                task.started_at = None;
                task.scheduled_at = now;
                task.updated_at = now;
                reaped += 1;
            }
        }

        if reaped > 0 {
            tracing::warn!(reaped = reaped, "Recovered stale running tasks");
            self.notify.notify_one();
        }
        Ok(reaped)
    }

    async fn requeue_failed(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = {
            let mut tasks = lock(&self.tasks);
            let Some(task) = tasks.get_mut(&task_id) else {
                return Ok(None);
            };
            if task.status != TaskStatus::Failed {
                return Ok(None);
            }
            let now = Utc::now();
            task.status = TaskStatus::Pending;
            task.retry_count = 0;
            task.result = None;
            task.started_at = None;
            task.completed_at = None;
            task.scheduled_at = now;
            task.updated_at = now;
            task.clone()
        };
        self.notify.notify_one();
        Ok(Some(task))
    }

    fn wakeup(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transfat_core::models::TaskType;

    fn new_session(user_id: Uuid, upload_id: &str) -> NewUploadSession {
        NewUploadSession {
            upload_id: upload_id.to_string(),
            user_id,
            key: format!("videos/{}/1-abc/clip.mp4", user_id),
            bucket: "local".to_string(),
            file_name: "clip.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            size: 12_582_912,
            chunk_size: 5 * 1024 * 1024,
        }
    }

    fn new_task(dedupe_key: Option<&str>) -> NewTask {
        NewTask {
            task_type: TaskType::TranscodeVideo,
            payload: serde_json::json!({ "videoUploadId": Uuid::new_v4() }),
            scheduled_at: Utc::now(),
            max_retries: 3,
            timeout_seconds: Some(60),
            dedupe_key: dedupe_key.map(String::from),
        }
    }

    #[tokio::test]
    async fn create_starts_created_and_pending() {
        let store = MemoryUploadSessionStore::new();
        let user = Uuid::new_v4();
        let session = store.create(new_session(user, "u-1")).await.unwrap();
        assert_eq!(session.status, UploadStatus::Created);
        assert_eq!(session.transcode_status, TranscodeStatus::Pending);
        assert!(store.create(new_session(user, "u-1")).await.is_err());
    }

    #[tokio::test]
    async fn ownership_scopes_lookups() {
        let store = MemoryUploadSessionStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let session = store.create(new_session(owner, "u-1")).await.unwrap();

        assert!(store
            .find_by_id_for_user(stranger, session.id)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_upload_id_for_user(stranger, "u-1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_upload_id_for_user(owner, "u-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn conditional_transition_only_fires_from_expected_states() {
        let store = MemoryUploadSessionStore::new();
        let session = store
            .create(new_session(Uuid::new_v4(), "u-1"))
            .await
            .unwrap();

        let moved = store
            .transition_status(session.id, &UploadStatus::ACTIVE, UploadStatus::Completed)
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, UploadStatus::Completed);

        let again = store
            .transition_status(session.id, &UploadStatus::ACTIVE, UploadStatus::Cancelled)
            .await
            .unwrap();
        assert!(again.is_none());
        let current = store.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(current.status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_completes_have_one_winner() {
        let store = Arc::new(MemoryUploadSessionStore::new());
        let session = store
            .create(new_session(Uuid::new_v4(), "u-1"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transition_status(session.id, &UploadStatus::ACTIVE, UploadStatus::Completed)
                    .await
                    .unwrap()
                    .is_some()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn finalize_requires_processing() {
        let store = MemoryUploadSessionStore::new();
        let session = store
            .create(new_session(Uuid::new_v4(), "u-1"))
            .await
            .unwrap();

        assert!(store
            .finalize_transcode(session.id, "videos/x/hls/master.m3u8", None)
            .await
            .unwrap()
            .is_none());

        store
            .transition_transcode_status(
                session.id,
                &TranscodeStatus::sources_of(TranscodeStatus::Processing),
                TranscodeStatus::Processing,
            )
            .await
            .unwrap()
            .unwrap();
        let done = store
            .finalize_transcode(session.id, "videos/x/hls/master.m3u8", Some("thumb.jpg"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.transcode_status, TranscodeStatus::Completed);
        assert_eq!(done.hls_master_key.as_deref(), Some("videos/x/hls/master.m3u8"));
        assert!(done.transcoded_at.is_some());
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_total() {
        let store = MemoryUploadSessionStore::new();
        let user = Uuid::new_v4();
        for i in 0..5 {
            store
                .create(new_session(user, &format!("u-{}", i)))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store
            .create(new_session(Uuid::new_v4(), "other"))
            .await
            .unwrap();

        let (page, total) = store.list_for_user(user, 0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].upload_id, "u-4");
        assert_eq!(page[1].upload_id, "u-3");

        let (tail, _) = store.list_for_user(user, 4, 2).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].upload_id, "u-0");
    }

    #[tokio::test]
    async fn listing_breaks_created_at_ties_by_id() {
        let store = MemoryUploadSessionStore::new();
        let user = Uuid::new_v4();
        for i in 0..5 {
            store
                .create(new_session(user, &format!("u-{}", i)))
                .await
                .unwrap();
        }
        let stamp = Utc::now();
        for session in lock(&store.sessions).values_mut() {
            session.created_at = stamp;
        }

        let mut expected: Vec<Uuid> = lock(&store.sessions).keys().copied().collect();
        expected.sort_by(|a, b| b.cmp(a));

        let mut paged = Vec::new();
        for offset in [0, 2, 4] {
            let (page, total) = store.list_for_user(user, offset, 2).await.unwrap();
            assert_eq!(total, 5);
            paged.extend(page.into_iter().map(|s| s.id));
        }
        assert_eq!(paged, expected);

        let (again, _) = store.list_for_user(user, 2, 2).await.unwrap();
        let again: Vec<Uuid> = again.into_iter().map(|s| s.id).collect();
        assert_eq!(again, expected[2..4].to_vec());
    }

    #[tokio::test]
    async fn dedupe_key_returns_existing_task() {
        let store = MemoryTaskStore::new();
        let first = store.create_task(new_task(Some("transcode:a"))).await.unwrap();
        let second = store.create_task(new_task(Some("transcode:a"))).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.all_tasks().len(), 1);

        store.create_task(new_task(None)).await.unwrap();
        store.create_task(new_task(None)).await.unwrap();
        assert_eq!(store.all_tasks().len(), 3);
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_respects_schedule() {
        let store = MemoryTaskStore::new();
        let mut delayed = new_task(None);
        delayed.scheduled_at = Utc::now() + Duration::seconds(60);
        let delayed = store.create_task(delayed).await.unwrap();
        assert_eq!(delayed.status, TaskStatus::Scheduled);
        let ready = store.create_task(new_task(None)).await.unwrap();

        let claimed = store.claim_next_task().await.unwrap().unwrap();
        assert_eq!(claimed.id, ready.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(store.claim_next_task().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_then_fail_counts_attempts() {
        let store = MemoryTaskStore::new();
        let task = store.create_task(new_task(None)).await.unwrap();
        store.claim_next_task().await.unwrap().unwrap();

        let retried = store
            .schedule_retry(task.id, 0, serde_json::json!({ "error": "boom" }))
            .await
            .unwrap();
        assert_eq!(retried.status, TaskStatus::Scheduled);
        assert_eq!(retried.retry_count, 1);

        let claimed = store.claim_next_task().await.unwrap().unwrap();
        assert_eq!(claimed.attempt(), 2);

        let failed = store
            .mark_failed(task.id, serde_json::json!({ "error": "boom" }))
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);

        let requeued = store.requeue_failed(task.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(requeued.retry_count, 0);
        assert!(store.requeue_failed(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reaper_recovers_abandoned_running_tasks() {
        let store = MemoryTaskStore::new();
        let mut abandoned = new_task(None);
        abandoned.timeout_seconds = Some(1);
        let abandoned = store.create_task(abandoned).await.unwrap();
        store.claim_next_task().await.unwrap().unwrap();

        {
            let mut tasks = lock(&store.tasks);
            let task = tasks.get_mut(&abandoned.id).unwrap();
            task.started_at = Some(Utc::now() - Duration::seconds(120));
        }

        assert_eq!(store.reap_stale_running_tasks(30).await.unwrap(), 1);
        let task = store.get_task(abandoned.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert_eq!(store.reap_stale_running_tasks(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_wakes_waiters() {
        let store = MemoryTaskStore::new();
        let notify = store.wakeup().unwrap();
        store.create_task(new_task(None)).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_millis(100), notify.notified())
            .await
            .expect("stored permit should wake immediately");
    }
}
