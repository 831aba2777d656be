use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use transfat_core::models::{NewUploadSession, TranscodeStatus, UploadSession, UploadStatus};
use transfat_core::AppError;

use crate::store_traits::UploadSessionStore;

#[derive(Clone)]
pub struct PgUploadSessionRepository {
    pool: PgPool,
}

impl PgUploadSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_strings<S: ToString>(statuses: &[S]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl UploadSessionStore for PgUploadSessionRepository {
    #[tracing::instrument(skip(self, new), fields(key = %new.key))]
    async fn create(&self, new: NewUploadSession) -> Result<UploadSession, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            INSERT INTO upload_sessions (
                upload_id, user_id, key, bucket, file_name, content_type, size, chunk_size
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id,
                upload_id,
                user_id,
                key,
                bucket,
                file_name,
                content_type,
                size,
                chunk_size,
                status,
                transcode_status,
                hls_master_key,
                thumbnail_key,
                created_at,
                updated_at,
                transcoded_at
            "#,
        )
        .bind(&new.upload_id)
        .bind(new.user_id)
        .bind(&new.key)
        .bind(&new.bucket)
        .bind(&new.file_name)
        .bind(&new.content_type)
        .bind(new.size)
        .bind(new.chunk_size)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            video_upload_id = %session.id,
            upload_id = %session.upload_id,
            user_id = %session.user_id,
            "Upload session created"
        );

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            SELECT
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            FROM upload_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            SELECT
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            FROM upload_sessions
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_upload_id_for_user(
        &self,
        user_id: Uuid,
        upload_id: &str,
    ) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            SELECT
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            FROM upload_sessions
            WHERE user_id = $1 AND upload_id = $2
            "#,
        )
        .bind(user_id)
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[tracing::instrument(skip(self, expected), fields(next = %next))]
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[UploadStatus],
        next: UploadStatus,
    ) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            UPDATE upload_sessions
            SET status = $3,
                updated_at = NOW()
            WHERE id = $1
                AND status = ANY($2)
            RETURNING
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            "#,
        )
        .bind(id)
        .bind(status_strings(expected))
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if session.is_none() {
            tracing::debug!(video_upload_id = %id, "Conditional status update matched no row");
        }

        Ok(session)
    }

    #[tracing::instrument(skip(self, expected), fields(next = %next))]
    async fn transition_transcode_status(
        &self,
        id: Uuid,
        expected: &[TranscodeStatus],
        next: TranscodeStatus,
    ) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            UPDATE upload_sessions
            SET transcode_status = $3,
                updated_at = NOW()
            WHERE id = $1
                AND transcode_status = ANY($2)
            RETURNING
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            "#,
        )
        .bind(id)
        .bind(status_strings(expected))
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn finalize_transcode(
        &self,
        id: Uuid,
        hls_master_key: &str,
        thumbnail_key: Option<&str>,
    ) -> Result<Option<UploadSession>, AppError> {
        let session = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            UPDATE upload_sessions
            SET transcode_status = 'COMPLETED',
                hls_master_key = $2,
                thumbnail_key = $3,
                transcoded_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
                AND transcode_status = 'PROCESSING'
            RETURNING
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            "#,
        )
        .bind(id)
        .bind(hls_master_key)
        .bind(thumbnail_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<UploadSession>, u64), AppError> {
        let sessions = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            SELECT
                id, upload_id, user_id, key, bucket, file_name, content_type, size,
                chunk_size, status, transcode_status, hls_master_key, thumbnail_key,
                created_at, updated_at, transcoded_at
            FROM upload_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM upload_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((sessions, total.max(0) as u64))
    }
}
