//! FFmpegService - HLS transcoding and thumbnail extraction.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::hls::{master_playlist, HlsConfig, Rendition};

/// Files produced by one transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    /// Flat directory holding `master.m3u8`, the rendition playlists and
    /// their segments.
    pub hls_dir: PathBuf,
    pub thumbnail: Option<PathBuf>,
}

pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `input` into `work_dir`. Implementations create everything
    /// under `work_dir` and nothing outside it.
    async fn transcode(&self, input: &Path, work_dir: &Path) -> Result<TranscodeOutput>;
}

#[derive(Debug, Clone)]
pub struct FFmpegService {
    ffmpeg_path: String,
    hls: HlsConfig,
}

impl FFmpegService {
    pub fn new(ffmpeg_path: String, hls: HlsConfig) -> Self {
        Self { ffmpeg_path, hls }
    }

    pub fn hls_config(&self) -> &HlsConfig {
        &self.hls
    }

    fn rendition_args(&self, input: &Path, out_dir: &Path, rendition: &Rendition) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-profile:v".to_string(),
            "main".to_string(),
            "-vf".to_string(),
            format!("scale=-2:{}", rendition.height),
            "-b:v".to_string(),
            format!("{}k", rendition.bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", rendition.maxrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", rendition.bufsize_kbps),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.hls.segment_duration.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_segment_filename".to_string(),
            out_dir
                .join(rendition.segment_pattern())
                .to_string_lossy()
                .to_string(),
            out_dir
                .join(rendition.playlist_name())
                .to_string_lossy()
                .to_string(),
        ]
    }

    /// Run ffmpeg to completion. The child is killed if this future is
    /// dropped, so a task timeout also stops the encoder.
    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(anyhow!("FFmpeg failed ({}): {}", output.status, tail));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, input, out_dir), fields(rendition = %rendition.name))]
    async fn generate_rendition(
        &self,
        input: &Path,
        out_dir: &Path,
        rendition: &Rendition,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        self.run_ffmpeg(&self.rendition_args(input, out_dir, rendition))
            .await
            .with_context(|| format!("Failed to generate {} rendition", rendition.name))?;
        tracing::info!(
            rendition = %rendition.name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "HLS rendition generated"
        );
        Ok(())
    }

    async fn extract_frame(&self, input: &Path, output: &Path, offset_secs: u64) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            offset_secs.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args).await?;

        // Seeking past the end exits 0 without writing a frame.
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(anyhow!("No frame at {}s", offset_secs)),
        }
    }

    /// Thumbnail at the configured offset, or the first frame for clips
    /// shorter than that. A missing thumbnail does not fail the transcode.
    async fn generate_thumbnail(&self, input: &Path, output: &Path) -> Option<PathBuf> {
        let offset = self.hls.thumbnail_offset_secs;
        let first = self.extract_frame(input, output, offset).await;
        let result = match first {
            Ok(()) => Ok(()),
            Err(e) if offset > 0 => {
                tracing::debug!(error = %e, "Thumbnail offset beyond clip, falling back to first frame");
                self.extract_frame(input, output, 0).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Some(output.to_path_buf()),
            Err(e) => {
                tracing::warn!(error = %e, "Thumbnail extraction failed");
                None
            }
        }
    }
}

#[async_trait]
impl Transcoder for FFmpegService {
    async fn transcode(&self, input: &Path, work_dir: &Path) -> Result<TranscodeOutput> {
        let hls_dir = work_dir.join("hls");
        tokio::fs::create_dir_all(&hls_dir)
            .await
            .context("Failed to create HLS output directory")?;

        futures::future::try_join_all(
            self.hls
                .renditions
                .iter()
                .map(|rendition| self.generate_rendition(input, &hls_dir, rendition)),
        )
        .await?;

        tokio::fs::write(
            hls_dir.join(MASTER_PLAYLIST_NAME),
            master_playlist(&self.hls.renditions),
        )
        .await
        .context("Failed to write master playlist")?;

        let thumbnail = self
            .generate_thumbnail(input, &work_dir.join("thumbnail.jpg"))
            .await;

        Ok(TranscodeOutput { hls_dir, thumbnail })
    }
}
