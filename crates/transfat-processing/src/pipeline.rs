//! Transcode orchestration: download → transcode → publish → finalize.
//!
//! Runs under an at-least-once queue, so every entry point re-checks the
//! session before doing work. A second delivery for an already transcoded
//! video returns [`TranscodeOutcome::Skipped`] without touching storage.

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use transfat_core::models::{TranscodeStatus, UploadSession, UploadStatus};
use transfat_core::TaskError;
use transfat_db::UploadSessionStore;
use transfat_storage::keys::{hls_key, thumbnail_key};
use transfat_storage::ObjectStore;

use crate::hls::content_type_for;
use crate::transcoder::{Transcoder, MASTER_PLAYLIST_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TranscodeOutcome {
    Skipped {
        reason: String,
    },
    Completed {
        master_key: String,
        thumbnail_key: Option<String>,
    },
}

impl TranscodeOutcome {
    fn skipped(reason: &str) -> Self {
        TranscodeOutcome::Skipped {
            reason: reason.to_string(),
        }
    }
}

pub struct TranscodePipeline {
    sessions: Arc<dyn UploadSessionStore>,
    storage: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    scratch_dir: Option<PathBuf>,
}

impl TranscodePipeline {
    pub fn new(
        sessions: Arc<dyn UploadSessionStore>,
        storage: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            sessions,
            storage,
            transcoder,
            scratch_dir,
        }
    }

    #[tracing::instrument(skip(self), fields(video_upload_id = %video_upload_id))]
    pub async fn run(&self, video_upload_id: Uuid) -> Result<TranscodeOutcome> {
        let session = self
            .sessions
            .find_by_id(video_upload_id)
            .await
            .context("Failed to load upload session")?
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!(
                    "Upload session {} not found",
                    video_upload_id
                ))
            })?;

        if session.status != UploadStatus::Completed {
            tracing::info!(status = %session.status, "Upload not complete, skipping transcode");
            return Ok(TranscodeOutcome::skipped("upload incomplete"));
        }
        if session.transcode_status == TranscodeStatus::Completed {
            tracing::info!("Video already transcoded, skipping");
            return Ok(TranscodeOutcome::skipped("already transcoded"));
        }

        let claimed = self
            .sessions
            .transition_transcode_status(
                video_upload_id,
                &TranscodeStatus::sources_of(TranscodeStatus::Processing),
                TranscodeStatus::Processing,
            )
            .await
            .context("Failed to mark transcode as processing")?;
        let Some(session) = claimed else {
            // Only COMPLETED is outside the source set.
            return Ok(TranscodeOutcome::skipped("already transcoded"));
        };

        tracing::info!(key = %session.key, size = session.size, "Starting transcode");
        let start = std::time::Instant::now();
        let guard = ProcessingGuard::new(self.sessions.clone(), video_upload_id);

        match self.run_stages(&session).await {
            Ok(outcome) => {
                guard.disarm();
                tracing::info!(
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Transcode completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                guard.disarm();
                tracing::error!(error = %format!("{:#}", e), "Transcode failed");
                mark_failed(self.sessions.as_ref(), video_upload_id).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, session: &UploadSession) -> Result<TranscodeOutcome> {
        // Removed on drop, whichever way this function exits.
        let scratch = self.scratch_dir().await?;
        let source = scratch.path().join("source");

        self.download(&session.key, &source).await?;

        let output = self
            .transcoder
            .transcode(&source, scratch.path())
            .await
            .context("Transcode stage failed")?;

        let master_key = self.publish_hls(session.id, &output.hls_dir).await?;

        let thumbnail = match output.thumbnail {
            Some(path) => {
                let key = thumbnail_key(session.id);
                self.publish_file(&path, &key).await?;
                Some(key)
            }
            None => None,
        };

        self.sessions
            .finalize_transcode(session.id, &master_key, thumbnail.as_deref())
            .await
            .context("Failed to finalize transcode")?
            .ok_or_else(|| anyhow!("Transcode status changed while processing"))?;

        Ok(TranscodeOutcome::Completed {
            master_key,
            thumbnail_key: thumbnail,
        })
    }

    async fn scratch_dir(&self) -> Result<TempDir> {
        match &self.scratch_dir {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .with_context(|| format!("Failed to create scratch root {}", root.display()))?;
                tempfile::Builder::new()
                    .prefix("transcode-")
                    .tempdir_in(root)
                    .context("Failed to create scratch directory")
            }
            None => TempDir::new().context("Failed to create scratch directory"),
        }
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let mut stream = self
            .storage
            .get_object(key)
            .await
            .with_context(|| format!("Failed to download {}", key))?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .context("Failed to create scratch source file")?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Source download interrupted")?;
            written += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .context("Failed to write scratch source file")?;
        }
        file.flush().await?;

        tracing::debug!(key = %key, bytes = written, "Source downloaded");
        Ok(())
    }

    /// Upload every file in `hls_dir` and return the master playlist key.
    async fn publish_hls(&self, video_upload_id: Uuid, hls_dir: &Path) -> Result<String> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(hls_dir)
            .await
            .context("Failed to read HLS output directory")?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let has_master = files
            .iter()
            .any(|p| p.file_name().and_then(|n| n.to_str()) == Some(MASTER_PLAYLIST_NAME));
        if !has_master {
            return Err(anyhow!("Transcoder produced no {}", MASTER_PLAYLIST_NAME));
        }

        for path in &files {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Invalid HLS output path: {}", path.display()))?;
            self.publish_file(path, &hls_key(video_upload_id, name))
                .await?;
        }

        tracing::info!(files = files.len(), "HLS output published");
        Ok(hls_key(video_upload_id, MASTER_PLAYLIST_NAME))
    }

    async fn publish_file(&self, path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.storage
            .put_object(key, Bytes::from(data), content_type_for(path))
            .await
            .with_context(|| format!("Failed to upload {}", key))?;
        Ok(())
    }
}

/// PROCESSING -> FAILED. A session that already left PROCESSING is left alone.
async fn mark_failed(sessions: &dyn UploadSessionStore, video_upload_id: Uuid) {
    if let Err(e) = sessions
        .transition_transcode_status(
            video_upload_id,
            &[TranscodeStatus::Processing],
            TranscodeStatus::Failed,
        )
        .await
    {
        tracing::error!(
            error = %e,
            video_upload_id = %video_upload_id,
            "Failed to mark transcode as failed"
        );
    }
}

/// Marks the transcode FAILED when `run` is dropped before it finishes, as
/// happens when the queue's per-task timeout fires.
struct ProcessingGuard {
    sessions: Arc<dyn UploadSessionStore>,
    video_upload_id: Uuid,
    armed: bool,
}

impl ProcessingGuard {
    fn new(sessions: Arc<dyn UploadSessionStore>, video_upload_id: Uuid) -> Self {
        Self {
            sessions,
            video_upload_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let video_upload_id = self.video_upload_id;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                video_upload_id = %video_upload_id,
                "Transcode abandoned outside a runtime; status left PROCESSING"
            );
            return;
        };

        tracing::warn!(
            video_upload_id = %video_upload_id,
            "Transcode abandoned before finishing, marking failed"
        );
        let sessions = self.sessions.clone();
        handle.spawn(async move {
            mark_failed(sessions.as_ref(), video_upload_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::TranscodeOutput;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transfat_core::models::NewUploadSession;
    use transfat_db::MemoryUploadSessionStore;
    use transfat_storage::LocalObjectStore;

    /// Writes a tiny fake HLS tree instead of running ffmpeg.
    struct StubTranscoder {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl StubTranscoder {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn transcode(&self, input: &Path, work_dir: &Path) -> Result<TranscodeOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(anyhow!("encoder crashed"));
            }
            assert!(tokio::fs::metadata(input).await?.len() > 0);

            let hls_dir = work_dir.join("hls");
            tokio::fs::create_dir_all(&hls_dir).await?;
            tokio::fs::write(hls_dir.join("master.m3u8"), "#EXTM3U\n").await?;
            tokio::fs::write(hls_dir.join("720p.m3u8"), "#EXTM3U\n").await?;
            tokio::fs::write(hls_dir.join("720p_000.ts"), b"ts-bytes").await?;
            let thumbnail = work_dir.join("thumbnail.jpg");
            tokio::fs::write(&thumbnail, b"jpeg").await?;
            Ok(TranscodeOutput {
                hls_dir,
                thumbnail: Some(thumbnail),
            })
        }
    }

    /// Never finishes, like an ffmpeg run stuck on a bad input.
    struct HangingTranscoder;

    #[async_trait]
    impl Transcoder for HangingTranscoder {
        async fn transcode(&self, _input: &Path, _work_dir: &Path) -> Result<TranscodeOutput> {
            std::future::pending().await
        }
    }

    struct Fixture {
        dir: TempDir,
        sessions: Arc<MemoryUploadSessionStore>,
        storage: Arc<LocalObjectStore>,
        session: UploadSession,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            LocalObjectStore::new(
                dir.path().join("objects"),
                "http://localhost:4000".to_string(),
                "secret",
            )
            .await
            .unwrap(),
        );
        let sessions = Arc::new(MemoryUploadSessionStore::new());
        let user = Uuid::new_v4();
        let key = format!("videos/{}/1-abcd1234/clip.mp4", user);
        storage
            .put_object(&key, Bytes::from_static(b"source-video"), "video/mp4")
            .await
            .unwrap();
        let session = sessions
            .create(NewUploadSession {
                upload_id: "upload-1".to_string(),
                user_id: user,
                key,
                bucket: "local".to_string(),
                file_name: "clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                size: 12,
                chunk_size: 5 * 1024 * 1024,
            })
            .await
            .unwrap();
        Fixture {
            dir,
            sessions,
            storage,
            session,
        }
    }

    fn pipeline(f: &Fixture, transcoder: Arc<StubTranscoder>) -> TranscodePipeline {
        TranscodePipeline::new(f.sessions.clone(), f.storage.clone(), transcoder, None)
    }

    async fn complete_upload(f: &Fixture) {
        f.sessions
            .transition_status(f.session.id, &UploadStatus::ACTIVE, UploadStatus::Completed)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn incomplete_upload_is_skipped() {
        let f = fixture().await;
        let transcoder = StubTranscoder::new(0);
        let outcome = pipeline(&f, transcoder.clone())
            .run(f.session.id)
            .await
            .unwrap();
        assert_eq!(outcome, TranscodeOutcome::skipped("upload incomplete"));
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completed_upload_is_published_and_finalized() {
        let f = fixture().await;
        complete_upload(&f).await;
        let transcoder = StubTranscoder::new(0);

        let outcome = pipeline(&f, transcoder.clone())
            .run(f.session.id)
            .await
            .unwrap();
        let master = hls_key(f.session.id, "master.m3u8");
        assert_eq!(
            outcome,
            TranscodeOutcome::Completed {
                master_key: master.clone(),
                thumbnail_key: Some(thumbnail_key(f.session.id)),
            }
        );

        let segment: Vec<Bytes> = f
            .storage
            .get_object(&hls_key(f.session.id, "720p_000.ts"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(segment.concat(), b"ts-bytes");

        let session = f.sessions.find_by_id(f.session.id).await.unwrap().unwrap();
        assert_eq!(session.transcode_status, TranscodeStatus::Completed);
        assert_eq!(session.hls_master_key.as_deref(), Some(master.as_str()));
        assert!(session.transcoded_at.is_some());
    }

    #[tokio::test]
    async fn second_delivery_is_a_no_op() {
        let f = fixture().await;
        complete_upload(&f).await;
        let transcoder = StubTranscoder::new(0);
        let pipeline = pipeline(&f, transcoder.clone());

        pipeline.run(f.session.id).await.unwrap();
        let again = pipeline.run(f.session.id).await.unwrap();
        assert_eq!(again, TranscodeOutcome::skipped("already transcoded"));
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_marks_failed_and_retry_recovers() {
        let f = fixture().await;
        complete_upload(&f).await;
        let transcoder = StubTranscoder::new(1);
        let pipeline = pipeline(&f, transcoder.clone());

        let err = pipeline.run(f.session.id).await.unwrap_err();
        assert!(!TaskError::is_unrecoverable(&err));
        let session = f.sessions.find_by_id(f.session.id).await.unwrap().unwrap();
        assert_eq!(session.transcode_status, TranscodeStatus::Failed);
        assert!(session.hls_master_key.is_none());

        let outcome = pipeline.run(f.session.id).await.unwrap();
        assert!(matches!(outcome, TranscodeOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn missing_session_is_unrecoverable() {
        let f = fixture().await;
        let err = pipeline(&f, StubTranscoder::new(0))
            .run(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(TaskError::is_unrecoverable(&err));
    }

    #[tokio::test]
    async fn missing_source_object_fails_the_attempt() {
        let f = fixture().await;
        complete_upload(&f).await;
        f.storage.delete_object(&f.session.key).await.unwrap();

        let err = pipeline(&f, StubTranscoder::new(0))
            .run(f.session.id)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to download"));
        let session = f.sessions.find_by_id(f.session.id).await.unwrap().unwrap();
        assert_eq!(session.transcode_status, TranscodeStatus::Failed);
    }

    #[tokio::test]
    async fn scratch_space_is_cleaned_up() {
        let f = fixture().await;
        complete_upload(&f).await;
        let scratch_root = f.dir.path().join("scratch");
        let pipeline = TranscodePipeline::new(
            f.sessions.clone(),
            f.storage.clone(),
            StubTranscoder::new(1),
            Some(scratch_root.clone()),
        );

        pipeline.run(f.session.id).await.unwrap_err();
        pipeline.run(f.session.id).await.unwrap();

        let mut entries = tokio::fs::read_dir(&scratch_root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timed_out_run_marks_failed() {
        let f = fixture().await;
        complete_upload(&f).await;
        let pipeline = TranscodePipeline::new(
            f.sessions.clone(),
            f.storage.clone(),
            Arc::new(HangingTranscoder),
            None,
        );

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), pipeline.run(f.session.id))
                .await;
        assert!(result.is_err());

        // The failure write runs on a spawned task after the drop.
        let mut status = TranscodeStatus::Processing;
        for _ in 0..100 {
            status = f
                .sessions
                .find_by_id(f.session.id)
                .await
                .unwrap()
                .unwrap()
                .transcode_status;
            if status != TranscodeStatus::Processing {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, TranscodeStatus::Failed);

        // The retry can claim the session again.
        let outcome = self::pipeline(&f, StubTranscoder::new(0))
            .run(f.session.id)
            .await
            .unwrap();
        assert!(matches!(outcome, TranscodeOutcome::Completed { .. }));
    }
}
