use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use transfat_core::models::{Task, TranscodePayload};
use transfat_core::TaskResultExt;
use transfat_processing::TranscodeOutcome;

use super::TaskHandler;
use crate::state::AppState;

pub struct TranscodeTaskHandler;

#[async_trait]
impl TaskHandler for TranscodeTaskHandler {
    #[tracing::instrument(
        skip(self, task, state),
        fields(task.id = %task.id, attempt = task.attempt(), video.id = tracing::field::Empty)
    )]
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value> {
        // A payload that does not parse will never parse.
        let payload: TranscodePayload = task
            .try_payload_as()
            .context("Failed to parse transcode payload")
            .unrecoverable()?;

        tracing::Span::current().record("video.id", payload.video_upload_id.to_string());
        tracing::info!(
            video_upload_id = %payload.video_upload_id,
            "Processing transcode task"
        );

        let outcome = state.tasks.pipeline.run(payload.video_upload_id).await?;

        match &outcome {
            TranscodeOutcome::Skipped { reason } => tracing::info!(
                video_upload_id = %payload.video_upload_id,
                reason = %reason,
                "Transcode skipped"
            ),
            TranscodeOutcome::Completed { master_key, .. } => tracing::info!(
                video_upload_id = %payload.video_upload_id,
                master_key = %master_key,
                "Transcode completed successfully"
            ),
        }

        serde_json::to_value(&outcome).context("Failed to serialize transcode outcome")
    }
}
