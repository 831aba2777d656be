use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use transfat_core::constants::{NEW_TASK_CHANNEL, STALE_TASK_FALLBACK_TIMEOUT_SECS};
use transfat_core::models::{NewTask, Task, TaskStatus};

use crate::store_traits::TaskStore;

const TASK_COLUMNS: &str = r#"
    id,
    task_type,
    status,
    payload,
    result,
    dedupe_key,
    scheduled_at,
    started_at,
    completed_at,
    retry_count,
    max_retries,
    timeout_seconds,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            "SELECT {} FROM tasks WHERE dedupe_key = $1",
            TASK_COLUMNS
        ))
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task by dedupe key")?;

        Ok(task)
    }
}

#[async_trait]
impl TaskStore for PgTaskRepository {
    #[tracing::instrument(skip(self, new), fields(task_type = %new.task_type))]
    async fn create_task(&self, new: NewTask) -> Result<Task> {
        let status = if new.scheduled_at > chrono::Utc::now() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        // Insert and notify in one transaction so listeners never wake before
        // the row is visible.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let inserted: Option<Task> = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            INSERT INTO tasks (
                task_type, status, payload, scheduled_at, max_retries, timeout_seconds, dedupe_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(new.task_type.to_string())
        .bind(status.as_str())
        .bind(&new.payload)
        .bind(new.scheduled_at)
        .bind(new.max_retries)
        .bind(new.timeout_seconds)
        .bind(new.dedupe_key.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                task_type = %new.task_type,
                "Failed to insert task into database"
            );
            anyhow::anyhow!("Failed to insert task into database: {}", e)
        })?;

        let Some(task) = inserted else {
            tx.rollback().await.ok();
            let key = new.dedupe_key.as_deref().unwrap_or_default();
            let existing = self
                .find_by_dedupe_key(key)
                .await?
                .with_context(|| format!("Task with dedupe key {} vanished", key))?;
            tracing::info!(
                task_id = %existing.id,
                dedupe_key = %key,
                status = %existing.status,
                "Task already enqueued, returning existing row"
            );
            return Ok(existing);
        };

        // Workers fall back to polling when NOTIFY fails.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(NEW_TASK_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, task_id = %task.id, "Failed to commit task creation");
            anyhow::anyhow!("Failed to commit transaction: {}", e)
        })?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            max_retries = task.max_retries,
            "Task created"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task")?;

        Ok(task)
    }

    /// Claims with `FOR UPDATE SKIP LOCKED`, so concurrent workers in any
    /// number of processes never receive the same row.
    #[tracing::instrument(skip(self))]
    async fn claim_next_task(&self) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM tasks
                WHERE status IN ('pending', 'scheduled')
                    AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next task")?;

        if let Some(ref task) = task {
            tracing::debug!(
                task_id = %task.id,
                task_type = %task.task_type,
                attempt = task.attempt(),
                "Task claimed"
            );
        }

        Ok(task)
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'completed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        Ok(task)
    }

    #[tracing::instrument(skip(self, error))]
    async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'failed',
                result = $2,
                retry_count = retry_count + 1,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        tracing::warn!(
            task_id = %task.id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            "Task marked as failed"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self, error))]
    async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: i64,
        error: serde_json::Value,
    ) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'scheduled',
                result = $3,
                retry_count = retry_count + 1,
                scheduled_at = NOW() + ($2 * interval '1 second'),
                started_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(delay_secs as f64)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule task retry")?;

        tracing::info!(
            task_id = %task.id,
            retry_count = task.retry_count,
            delay_secs = delay_secs,
            "Task retry scheduled"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE
                    WHEN retry_count + 1 >= max_retries THEN 'failed'
                    ELSE 'pending'
                END,
                retry_count = retry_count + 1,
                result = jsonb_build_object('error', 'worker stopped responding'),
                completed_at = CASE
                    WHEN retry_count + 1 >= max_retries THEN NOW()
                    ELSE NULL
                END,
                started_at = NULL,
                scheduled_at = NOW(),
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at < NOW()
                    - ((COALESCE(timeout_seconds, $1) + $2) * interval '1 second')
            "#,
        )
        .bind(STALE_TASK_FALLBACK_TIMEOUT_SECS as f64)
        .bind(grace_period_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped = reaped, "Recovered stale running tasks");
        }
        Ok(reaped)
    }

    #[tracing::instrument(skip(self))]
    async fn requeue_failed(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'pending',
                retry_count = 0,
                result = NULL,
                started_at = NULL,
                completed_at = NULL,
                scheduled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to requeue task")?;

        if let Some(ref task) = task {
            tracing::info!(task_id = %task.id, "Failed task requeued");
        }

        Ok(task)
    }
}
