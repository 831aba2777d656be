//! Task queue: worker pool, LISTEN/NOTIFY or polling, retry, and submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] only stops claiming. Use
//! [`TaskQueue::shutdown_and_drain`] to also wait for in-flight tasks.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use transfat_core::constants::NEW_TASK_CHANNEL;
use transfat_core::models::{EnqueueOptions, NewTask, Task, TaskPayload, TaskStatus, TaskType};
use transfat_core::{Config, TaskError};
use transfat_db::TaskStore;

use crate::context::TaskHandlerContext;

/// Maximum delay in seconds before retrying a failed task. Caps exponential backoff
/// so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    let exp = retry_count.clamp(0, 16) as u32;
    2_u64.pow(exp).min(MAX_RETRY_BACKOFF_SECS)
}

/// Outcome of one attempt, emitted after the store has been updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub task_type: TaskType,
    /// `Completed`, `Failed`, or `Scheduled` when a retry was queued.
    pub status: TaskStatus,
    /// 1-based attempt that produced this report.
    pub attempt: i32,
}

pub type TaskReportSender = mpsc::Sender<TaskReport>;

#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    /// Total attempts for tasks enqueued without an explicit budget.
    pub max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. Zero disables it.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub stale_task_grace_period_secs: i64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            poll_interval_ms: 1000,
            default_timeout_seconds: 3600,
            max_retries: 3,
            stale_task_reap_interval_secs: 60,
            stale_task_grace_period_secs: 300,
        }
    }
}

impl TaskQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.task_queue_max_workers(),
            poll_interval_ms: config.task_queue_poll_interval_ms(),
            default_timeout_seconds: config.task_queue_default_timeout_seconds(),
            max_retries: config.task_queue_max_retries(),
            stale_task_reap_interval_secs: config.task_queue_stale_task_reap_interval_secs(),
            stale_task_grace_period_secs: config.task_queue_stale_task_grace_period_secs(),
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    config: TaskQueueConfig,
    semaphore: Arc<Semaphore>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    started: Arc<AtomicBool>,
}

impl TaskQueue {
    /// Create a queue that accepts submissions. No worker runs until
    /// [`TaskQueue::start_workers`] is called, so the application state that
    /// owns this queue can be built first and handed back as the dispatch
    /// context.
    pub fn new(store: Arc<dyn TaskStore>, config: TaskQueueConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let workers = config.max_workers.max(1);
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(workers)),
            config,
            shutdown_tx: Arc::new(shutdown_tx),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Spawn the worker pool.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake immediately
    /// when tasks are created, in addition to polling at `poll_interval_ms`. Stores that
    /// expose [`TaskStore::wakeup`] wake the pool in-process. Calling this twice is a
    /// no-op.
    pub fn start_workers(
        &self,
        context: Weak<dyn TaskHandlerContext>,
        pool: Option<sqlx::PgPool>,
        report_tx: Option<TaskReportSender>,
    ) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Task queue workers already started");
            return;
        }

        let queue = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            queue.worker_pool(context, shutdown_rx, pool, report_tx).await;
        });
    }

    /// Submit a typed payload. The payload's dedupe key is used unless the
    /// options carry one.
    pub async fn enqueue<P: TaskPayload>(
        &self,
        payload: &P,
        mut options: EnqueueOptions,
    ) -> Result<Task> {
        if options.dedupe_key.is_none() {
            options.dedupe_key = payload.dedupe_key();
        }
        let value =
            serde_json::to_value(payload).context("Failed to serialize task payload")?;
        self.submit_task(P::task_type(), value, options).await
    }

    /// Submit a new task to the queue. With a `dedupe_key` already present the
    /// existing task is returned unchanged.
    #[tracing::instrument(skip(self, payload, options), fields(task_type = %task_type))]
    pub async fn submit_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Task> {
        let scheduled_at = Utc::now() + options.delay.unwrap_or_else(chrono::Duration::zero);
        let new = NewTask {
            task_type,
            payload,
            scheduled_at,
            max_retries: options.max_attempts.unwrap_or(self.config.max_retries).max(1),
            timeout_seconds: Some(
                options
                    .timeout_seconds
                    .unwrap_or(self.config.default_timeout_seconds),
            ),
            dedupe_key: options.dedupe_key,
        };

        let task = self.store.create_task(new).await.map_err(|e| {
            tracing::error!(
                error = %e,
                task_type = %task_type,
                "Failed to create task in store"
            );
            e.context("Failed to create task in store")
        })?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task_type,
            status = %task.status,
            "Task submitted to queue"
        );

        Ok(task)
    }

    /// Reset a task that exhausted its attempts so it runs again.
    pub async fn requeue_failed(&self, task_id: Uuid) -> Result<Option<Task>> {
        self.store.requeue_failed(task_id).await
    }

    async fn worker_pool(
        self,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: watch::Receiver<bool>,
        pool: Option<sqlx::PgPool>,
        report_tx: Option<TaskReportSender>,
    ) {
        let use_listen = pool.is_some();
        let wakeup = self.store.wakeup();
        tracing::info!(
            max_workers = self.config.max_workers,
            poll_interval_ms = self.config.poll_interval_ms,
            listen_notify = use_listen,
            in_process_wakeup = wakeup.is_some(),
            "Task queue worker pool started"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let mut listener_shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                tokio::select! {
                    _ = Self::listen_for_new_tasks(pool, notify_tx) => {}
                    _ = listener_shutdown.changed() => {}
                }
            });
        } else {
            drop(notify_tx);
        }

        if self.config.stale_task_reap_interval_secs > 0 {
            self.spawn_reaper();
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("Task queue worker pool shutting down");
                    break;
                }
                Some(()) = notify_rx.recv() => {
                    self.claim_available(&context, &report_tx).await;
                }
                _ = Self::wait_for_wakeup(wakeup.as_deref()) => {
                    self.claim_available(&context, &report_tx).await;
                }
                _ = sleep(poll_interval) => {
                    self.claim_available(&context, &report_tx).await;
                }
            }
        }

        tracing::info!("Task queue worker pool stopped");
    }

    async fn wait_for_wakeup(wakeup: Option<&Notify>) {
        match wakeup {
            Some(notify) => notify.notified().await,
            None => std::future::pending().await,
        }
    }

    async fn listen_for_new_tasks(pool: sqlx::PgPool, tx: mpsc::Sender<()>) {
        loop {
            match sqlx::postgres::PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(e) = listener.listen(NEW_TASK_CHANNEL).await {
                        tracing::warn!(error = %e, "LISTEN failed, will retry");
                        sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                    while listener.recv().await.is_ok() {
                        let _ = tx.send(()).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "PgListener connect failed, will retry");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    fn spawn_reaper(&self) {
        let store = self.store.clone();
        let reap_interval = Duration::from_secs(self.config.stale_task_reap_interval_secs);
        let grace_period = self.config.stale_task_grace_period_secs;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = store.reap_stale_running_tasks(grace_period).await {
                            tracing::error!(error = %e, "Stale task reaper failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    /// Claim until the pool is full or nothing is due.
    async fn claim_available(
        &self,
        context: &Weak<dyn TaskHandlerContext>,
        report_tx: &Option<TaskReportSender>,
    ) {
        while !*self.shutdown_tx.borrow() && self.claim_and_dispatch_one(context, report_tx).await
        {}
    }

    /// Returns true when a task was handed to a worker.
    async fn claim_and_dispatch_one(
        &self,
        context: &Weak<dyn TaskHandlerContext>,
        report_tx: &Option<TaskReportSender>,
    ) -> bool {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return false;
            }
        };

        match self.store.claim_next_task().await {
            Ok(Some(task)) => {
                let store = self.store.clone();
                let ctx = context.clone();
                let report_tx = report_tx.clone();
                let default_timeout = self.config.default_timeout_seconds;

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) =
                        Self::process_task(task, store, ctx, report_tx, default_timeout).await
                    {
                        tracing::error!(error = %e, "Task processing failed");
                    }
                });
                true
            }
            Ok(None) => {
                tracing::trace!("No tasks available in queue");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim task from queue");
                false
            }
        }
    }

    #[tracing::instrument(
        skip(task, store, context, report_tx, default_timeout),
        fields(task.id = %task.id, task.type = %task.task_type, attempt = task.attempt())
    )]
    async fn process_task(
        task: Task,
        store: Arc<dyn TaskStore>,
        context: Weak<dyn TaskHandlerContext>,
        report_tx: Option<TaskReportSender>,
        default_timeout: i32,
    ) -> Result<()> {
        // Left in `running`; the reaper returns it to the queue.
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("TaskHandlerContext was dropped, cannot process task")
        })?;

        let timeout_secs = task.timeout_seconds.unwrap_or(default_timeout).max(1) as u64;
        let started = std::time::Instant::now();
        let result =
            tokio::time::timeout(Duration::from_secs(timeout_secs), ctx.dispatch_task(&task))
                .await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = match result {
            Ok(Ok(task_result)) => {
                store
                    .mark_completed(task.id, task_result)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    duration_ms = duration_ms,
                    "Task completed successfully"
                );
                TaskStatus::Completed
            }
            Ok(Err(e)) => {
                let unrecoverable = TaskError::is_unrecoverable(&e);
                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    retry_count = task.retry_count,
                    max_retries = task.max_retries,
                    unrecoverable = unrecoverable,
                    duration_ms = duration_ms,
                    "Task execution failed"
                );
                let error_result = json!({
                    "error": format!("{:#}", e),
                    "attempt": task.attempt(),
                    "unrecoverable": unrecoverable,
                });
                Self::record_failure(&task, store.as_ref(), error_result, unrecoverable).await?
            }
            Err(_) => {
                tracing::error!(
                    task_id = %task.id,
                    timeout_seconds = timeout_secs,
                    "Task execution timed out"
                );
                let error_result = json!({
                    "error": "Task execution timed out",
                    "attempt": task.attempt(),
                    "timeout_seconds": timeout_secs,
                });
                Self::record_failure(&task, store.as_ref(), error_result, false).await?
            }
        };

        if let Some(tx) = report_tx {
            let _ = tx
                .send(TaskReport {
                    task_id: task.id,
                    task_type: task.task_type,
                    status,
                    attempt: task.attempt(),
                })
                .await;
        }
        Ok(())
    }

    /// Retry with backoff while attempts remain, otherwise park the task in
    /// `failed` with its error for inspection.
    async fn record_failure(
        task: &Task,
        store: &dyn TaskStore,
        error_result: serde_json::Value,
        unrecoverable: bool,
    ) -> Result<TaskStatus> {
        if !unrecoverable && task.can_retry() {
            let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
            tracing::info!(
                task_id = %task.id,
                next_attempt = task.attempt() + 1,
                backoff_seconds = backoff_seconds,
                "Scheduling task retry"
            );
            store
                .schedule_retry(task.id, backoff_seconds as i64, error_result)
                .await
                .context("Failed to schedule task retry")?;
            return Ok(TaskStatus::Scheduled);
        }

        store
            .mark_failed(task.id, error_result)
            .await
            .context("Failed to mark task as failed")?;
        if unrecoverable {
            tracing::error!(task_id = %task.id, "Task failed with unrecoverable error, will not retry");
        } else {
            tracing::error!(task_id = %task.id, "Task failed after max retries");
        }
        Ok(TaskStatus::Failed)
    }

    /// Signals the worker pool to stop claiming new tasks and returns
    /// immediately. In-flight tasks keep running.
    pub fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        self.shutdown_tx.send_replace(true);
    }

    /// Stop claiming, then wait up to `timeout` for in-flight tasks by
    /// acquiring every worker permit. Returns false if tasks were still
    /// running when the timeout hit; those are picked up again by the reaper.
    pub async fn shutdown_and_drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        let permits = self.config.max_workers.max(1) as u32;
        match tokio::time::timeout(timeout, self.semaphore.acquire_many(permits)).await {
            Ok(Ok(_all)) => {
                tracing::info!("Task queue drained");
                true
            }
            Ok(Err(_)) => true,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    in_flight = permits as usize - self.semaphore.available_permits(),
                    "Task queue drain timed out, abandoning in-flight tasks"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use transfat_core::models::TranscodePayload;
    use transfat_db::MemoryTaskStore;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(40), MAX_RETRY_BACKOFF_SECS);
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailOnce,
        FailForever,
        Unrecoverable,
        Hang,
        Slow,
    }

    struct TestContext {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl TestContext {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskHandlerContext for TestContext {
        async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(json!({ "taskId": task.id })),
                Behavior::FailOnce if call == 0 => Err(anyhow::anyhow!("flaky store")),
                Behavior::FailOnce => Ok(json!({ "recovered": true })),
                Behavior::FailForever => Err(anyhow::anyhow!("always broken")),
                Behavior::Unrecoverable => {
                    Err(TaskError::unrecoverable(anyhow::anyhow!("session missing")).into())
                }
                Behavior::Hang => {
                    sleep(Duration::from_secs(60)).await;
                    Ok(json!({}))
                }
                Behavior::Slow => {
                    sleep(Duration::from_millis(300)).await;
                    Ok(json!({ "slow": true }))
                }
            }
        }
    }

    fn test_config() -> TaskQueueConfig {
        TaskQueueConfig {
            max_workers: 2,
            poll_interval_ms: 20,
            default_timeout_seconds: 30,
            max_retries: 3,
            stale_task_reap_interval_secs: 0,
            stale_task_grace_period_secs: 0,
        }
    }

    fn start(
        behavior: Behavior,
    ) -> (
        TaskQueue,
        Arc<MemoryTaskStore>,
        Arc<TestContext>,
        mpsc::Receiver<TaskReport>,
    ) {
        let store = Arc::new(MemoryTaskStore::new());
        let queue = TaskQueue::new(store.clone(), test_config());
        let ctx = TestContext::new(behavior);
        let dyn_ctx: Arc<dyn TaskHandlerContext> = ctx.clone();
        let (tx, rx) = mpsc::channel(16);
        queue.start_workers(Arc::downgrade(&dyn_ctx), None, Some(tx));
        // Keep the strong reference alive through `ctx`.
        drop(dyn_ctx);
        (queue, store, ctx, rx)
    }

    async fn next_report(rx: &mut mpsc::Receiver<TaskReport>, secs: u64) -> TaskReport {
        tokio::time::timeout(Duration::from_secs(secs), rx.recv())
            .await
            .expect("timed out waiting for task report")
            .expect("report channel closed")
    }

    fn payload() -> TranscodePayload {
        TranscodePayload {
            video_upload_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn successful_task_is_completed_and_reported() {
        let (queue, store, ctx, mut rx) = start(Behavior::Succeed);
        let task = queue
            .enqueue(&payload(), EnqueueOptions::default())
            .await
            .unwrap();

        let report = next_report(&mut rx, 5).await;
        assert_eq!(report.task_id, task.id);
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.attempt, 1);
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);

        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert!(stored.result.is_some());
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_absorbed() {
        let store = Arc::new(MemoryTaskStore::new());
        let queue = TaskQueue::new(store.clone(), test_config());
        let p = payload();
        let a = queue.enqueue(&p, EnqueueOptions::default()).await.unwrap();
        let b = queue.enqueue(&p, EnqueueOptions::default()).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.dedupe_key, p.dedupe_key());
        assert_eq!(store.all_tasks().len(), 1);
    }

    #[tokio::test]
    async fn recoverable_failure_is_retried_with_backoff() {
        let (queue, store, ctx, mut rx) = start(Behavior::FailOnce);
        let task = queue
            .enqueue(&payload(), EnqueueOptions::default())
            .await
            .unwrap();

        let first = next_report(&mut rx, 5).await;
        assert_eq!(first.status, TaskStatus::Scheduled);
        let scheduled = store.get_task(task.id).await.unwrap().unwrap();
        assert!(scheduled.scheduled_at > Utc::now());

        let second = next_report(&mut rx, 5).await;
        assert_eq!(second.status, TaskStatus::Completed);
        assert_eq!(second.attempt, 2);
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unrecoverable_error_skips_retries() {
        let (queue, store, ctx, mut rx) = start(Behavior::Unrecoverable);
        let task = queue
            .enqueue(&payload(), EnqueueOptions::default())
            .await
            .unwrap();

        let report = next_report(&mut rx, 5).await;
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);

        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.result.unwrap()["unrecoverable"], json!(true));
    }

    #[tokio::test]
    async fn exhausted_task_stays_failed_until_requeued() {
        let (queue, store, ctx, mut rx) = start(Behavior::FailForever);
        let task = queue
            .enqueue(
                &payload(),
                EnqueueOptions {
                    max_attempts: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(next_report(&mut rx, 5).await.status, TaskStatus::Failed);
        assert_eq!(
            store.get_task(task.id).await.unwrap().unwrap().status,
            TaskStatus::Failed
        );

        let requeued = queue.requeue_failed(task.id).await.unwrap().unwrap();
        assert_eq!(requeued.retry_count, 0);
        assert_eq!(next_report(&mut rx, 5).await.status, TaskStatus::Failed);
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hung_handler_times_out() {
        let (queue, store, _ctx, mut rx) = start(Behavior::Hang);
        let task = queue
            .enqueue(
                &payload(),
                EnqueueOptions {
                    max_attempts: Some(1),
                    timeout_seconds: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = next_report(&mut rx, 5).await;
        assert_eq!(report.status, TaskStatus::Failed);
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.result.unwrap()["error"], json!("Task execution timed out"));
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_tasks() {
        let (queue, store, _ctx, _rx) = start(Behavior::Slow);
        let task = queue
            .enqueue(&payload(), EnqueueOptions::default())
            .await
            .unwrap();

        // Wait until a worker owns the task.
        for _ in 0..100 {
            let current = store.get_task(task.id).await.unwrap().unwrap();
            if current.status == TaskStatus::Running {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert!(queue.shutdown_and_drain(Duration::from_secs(5)).await);
        let done = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        // Nothing is claimed after shutdown.
        let late = queue
            .enqueue(&payload(), EnqueueOptions::default())
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(
            store.get_task(late.id).await.unwrap().unwrap().status,
            TaskStatus::Pending
        );
    }
}
