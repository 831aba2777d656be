//! Client-side state machine for one resumable upload.
//!
//! ```text
//! IDLE -> UPLOADING -> { PAUSED <-> UPLOADING } -> { COMPLETED | CANCELLED | FAILED }
//! ```
//!
//! The transfer loop checks for cancel, then pause, before every part. A
//! paused loop parks on a single-slot rendezvous: `resume` fills the slot with
//! a resume signal, `cancel` with a cancel signal, so a cancelled upload never
//! stays parked.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use transfat_core::models::{InitiateUploadRequest, PartETag, PartPlan, UploadStatus};
use uuid::Uuid;

use crate::api::UploadCoordinatorApi;
use crate::error::{TransferError, UploadError};
use crate::source::PartSource;
use crate::transport::PartTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Uploading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ControllerState::Completed | ControllerState::Cancelled | ControllerState::Failed
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Idle => "IDLE",
            ControllerState::Uploading => "UPLOADING",
            ControllerState::Paused => "PAUSED",
            ControllerState::Completed => "COMPLETED",
            ControllerState::Cancelled => "CANCELLED",
            ControllerState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Parts acknowledged by the store so far. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed_parts: u32,
    pub total_parts: u32,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total_parts == 0 {
            0.0
        } else {
            self.completed_parts as f64 / self.total_parts as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Tries per part, each with a freshly signed URL.
    pub max_part_attempts: u32,
    /// Base delay before retrying a transient failure; grows linearly per attempt.
    pub retry_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_part_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub video_upload_id: Uuid,
    pub upload_id: String,
    pub part_count: u32,
}

enum Wake {
    Resume,
    Cancel,
}

struct Inner {
    state: ControllerState,
    upload_id: Option<String>,
    /// Held only while the loop is parked on a pause.
    resume_slot: Option<oneshot::Sender<Wake>>,
}

pub struct UploadController {
    api: Arc<dyn UploadCoordinatorApi>,
    transport: Arc<dyn PartTransport>,
    config: ControllerConfig,
    inner: Mutex<Inner>,
    progress_tx: watch::Sender<Progress>,
}

impl UploadController {
    pub fn new(
        api: Arc<dyn UploadCoordinatorApi>,
        transport: Arc<dyn PartTransport>,
        config: ControllerConfig,
    ) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            api,
            transport,
            config,
            inner: Mutex::new(Inner {
                state: ControllerState::Idle,
                upload_id: None,
                resume_slot: None,
            }),
            progress_tx,
        }
    }

    pub async fn state(&self) -> ControllerState {
        self.inner.lock().await.state
    }

    /// The coordinator's multipart upload id, once initiated.
    pub async fn upload_id(&self) -> Option<String> {
        self.inner.lock().await.upload_id.clone()
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Run the whole upload. Returns once the coordinator accepted the
    /// completion, or with the error that ended it. A cancelled upload
    /// returns [`UploadError::Cancelled`] and is never reported as FAILED.
    pub async fn start(
        &self,
        source: PartSource,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadOutcome, UploadError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state != ControllerState::Idle {
                return Err(UploadError::InvalidState(format!(
                    "Cannot start an upload that is {}",
                    inner.state
                )));
            }
            inner.state = ControllerState::Uploading;
        }

        match self.run(&source, file_name, content_type).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn run(
        &self,
        source: &PartSource,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadOutcome, UploadError> {
        let request = InitiateUploadRequest {
            file_name: file_name.to_string(),
            file_size: source.size(),
            content_type: content_type.to_string(),
        };
        let session = self.api.initiate(&request).await?;

        // pause() or cancel() may have run before there was an id to report.
        let early = {
            let mut inner = self.inner.lock().await;
            inner.upload_id = Some(session.upload_id.clone());
            inner.state
        };
        match early {
            ControllerState::Cancelled => {
                self.report(&session.upload_id, UploadStatus::Cancelled)
                    .await;
                return Err(UploadError::Cancelled);
            }
            ControllerState::Paused => {
                self.report(&session.upload_id, UploadStatus::Paused).await;
            }
            _ => {}
        }

        let plan = PartPlan::new(source.size(), session.chunk_size);
        if plan.part_count() != session.part_count {
            return Err(UploadError::InvalidState(format!(
                "Coordinator planned {} parts, the source splits into {}",
                session.part_count,
                plan.part_count()
            )));
        }

        tracing::info!(
            upload_id = %session.upload_id,
            video_upload_id = %session.video_upload_id,
            part_count = plan.part_count(),
            chunk_size = session.chunk_size,
            "Upload initiated"
        );

        self.progress_tx.send_replace(Progress {
            completed_parts: 0,
            total_parts: plan.part_count(),
        });

        let parts = self.send_parts(&session.upload_id, &plan, source).await?;

        self.checkpoint().await?;
        let completed = match self.api.complete(&session.upload_id, &parts).await {
            Err(err) if err.is_part_mismatch() => {
                // Parts the store lost or never acknowledged; re-sending
                // replaces whatever it holds for each number.
                tracing::warn!(
                    upload_id = %session.upload_id,
                    error = %err,
                    "Coordinator rejected the part list, re-sending all parts"
                );
                let parts = self.send_parts(&session.upload_id, &plan, source).await?;
                self.checkpoint().await?;
                self.api.complete(&session.upload_id, &parts).await?
            }
            other => other?,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.state = ControllerState::Completed;
            inner.resume_slot = None;
        }
        tracing::info!(
            upload_id = %session.upload_id,
            video_upload_id = %completed.video_upload_id,
            "Upload completed"
        );

        Ok(UploadOutcome {
            video_upload_id: completed.video_upload_id,
            upload_id: session.upload_id,
            part_count: plan.part_count(),
        })
    }

    /// Transfer every part of the plan in order, stopping at pause and
    /// cancel checkpoints between parts.
    async fn send_parts(
        &self,
        upload_id: &str,
        plan: &PartPlan,
        source: &PartSource,
    ) -> Result<Vec<PartETag>, UploadError> {
        let mut parts = Vec::with_capacity(plan.part_count() as usize);
        for part_number in plan.part_numbers() {
            self.checkpoint().await?;

            let range = plan.range(part_number).ok_or_else(|| {
                UploadError::InvalidState(format!("Part {} is outside the plan", part_number))
            })?;
            let body = source
                .read_range(range.start, (range.end - range.start) as usize)
                .await?;

            let e_tag = self.transfer_part(upload_id, part_number, body).await?;
            parts.push(PartETag {
                part_number: part_number as i32,
                e_tag,
            });

            self.progress_tx
                .send_modify(|p| p.completed_parts = p.completed_parts.max(part_number));
            tracing::debug!(
                upload_id,
                part_number,
                total_parts = plan.part_count(),
                "Part uploaded"
            );
        }
        Ok(parts)
    }

    /// Cancel wins over pause. A paused loop waits here until resumed or cancelled.
    async fn checkpoint(&self) -> Result<(), UploadError> {
        loop {
            let wake = {
                let mut inner = self.inner.lock().await;
                match inner.state {
                    ControllerState::Cancelled => return Err(UploadError::Cancelled),
                    ControllerState::Paused => {
                        let (tx, rx) = oneshot::channel();
                        inner.resume_slot = Some(tx);
                        rx
                    }
                    _ => return Ok(()),
                }
            };

            match wake.await {
                Ok(Wake::Cancel) => return Err(UploadError::Cancelled),
                // Re-check the state after any wake-up.
                Ok(Wake::Resume) | Err(_) => continue,
            }
        }
    }

    async fn ensure_not_cancelled(&self) -> Result<(), UploadError> {
        if self.inner.lock().await.state == ControllerState::Cancelled {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    /// Send one part, re-requesting a signed URL for every attempt.
    async fn transfer_part(
        &self,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, UploadError> {
        let max_attempts = self.config.max_part_attempts.max(1);
        let mut attempt = 1;
        loop {
            let signed = self.api.part_url(upload_id, part_number).await?;
            match self.transport.put_part(&signed.url, body.clone()).await {
                Ok(e_tag) => return Ok(e_tag.trim_matches('"').to_string()),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        upload_id,
                        part_number,
                        attempt,
                        error = %err,
                        "Part transfer failed, retrying with a fresh URL"
                    );
                    if err != TransferError::Expired {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                    attempt += 1;
                    self.ensure_not_cancelled().await?;
                }
                Err(source) => {
                    return Err(UploadError::Transfer {
                        part_number,
                        source,
                    })
                }
            }
        }
    }

    /// Move to FAILED and tell the coordinator, unless the error is (or raced
    /// with) a cancellation.
    async fn fail(&self, err: UploadError) -> UploadError {
        let upload_id = {
            let mut inner = self.inner.lock().await;
            if inner.state == ControllerState::Cancelled || matches!(err, UploadError::Cancelled)
            {
                return UploadError::Cancelled;
            }
            inner.state = ControllerState::Failed;
            inner.resume_slot = None;
            inner.upload_id.clone()
        };

        tracing::error!(error = %err, upload_id = ?upload_id, "Upload failed");
        if let Some(upload_id) = upload_id {
            self.report(&upload_id, UploadStatus::Failed).await;
        }
        err
    }

    /// No-op unless UPLOADING. The loop parks before its next part.
    pub async fn pause(&self) {
        let upload_id = {
            let mut inner = self.inner.lock().await;
            if inner.state != ControllerState::Uploading {
                return;
            }
            inner.state = ControllerState::Paused;
            inner.upload_id.clone()
        };
        if let Some(upload_id) = upload_id {
            self.report(&upload_id, UploadStatus::Paused).await;
        }
    }

    /// No-op unless PAUSED. Releases the parked loop, if it is parked.
    pub async fn resume(&self) {
        let upload_id = {
            let mut inner = self.inner.lock().await;
            if inner.state != ControllerState::Paused {
                return;
            }
            inner.state = ControllerState::Uploading;
            if let Some(slot) = inner.resume_slot.take() {
                let _ = slot.send(Wake::Resume);
            }
            inner.upload_id.clone()
        };
        if let Some(upload_id) = upload_id {
            self.report(&upload_id, UploadStatus::Uploading).await;
        }
    }

    /// No-op once terminal. Wakes a parked loop so it observes the cancel.
    pub async fn cancel(&self) {
        let upload_id = {
            let mut inner = self.inner.lock().await;
            if inner.state.is_terminal() {
                return;
            }
            inner.state = ControllerState::Cancelled;
            if let Some(slot) = inner.resume_slot.take() {
                let _ = slot.send(Wake::Cancel);
            }
            inner.upload_id.clone()
        };
        if let Some(upload_id) = upload_id {
            self.report(&upload_id, UploadStatus::Cancelled).await;
        }
    }

    /// Succeeds only in a terminal state; an active upload must be cancelled first.
    pub async fn remove(&self) -> Result<(), UploadError> {
        let state = self.state().await;
        if state.is_terminal() {
            Ok(())
        } else {
            Err(UploadError::InvalidState(format!(
                "Cannot remove an upload that is {}; cancel it first",
                state
            )))
        }
    }

    /// Coordinator notifications never roll back local state.
    async fn report(&self, upload_id: &str, status: UploadStatus) {
        if let Err(e) = self.api.update_status(upload_id, status).await {
            tracing::warn!(
                upload_id,
                status = %status,
                error = %e,
                "Failed to report upload status"
            );
        }
    }
}
