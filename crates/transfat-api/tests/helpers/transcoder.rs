//! A transcoder that writes a fixed HLS tree instead of running ffmpeg.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use transfat_processing::{TranscodeOutput, Transcoder};

pub const STUB_MASTER_PLAYLIST: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n720p.m3u8\n";

#[derive(Default)]
pub struct StubTranscoder {
    pub calls: AtomicUsize,
}

impl StubTranscoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(&self, input: &Path, work_dir: &Path) -> Result<TranscodeOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(
            tokio::fs::metadata(input).await?.len() > 0,
            "source download is empty"
        );

        let hls_dir = work_dir.join("hls");
        tokio::fs::create_dir_all(&hls_dir).await?;
        tokio::fs::write(hls_dir.join("master.m3u8"), STUB_MASTER_PLAYLIST).await?;
        tokio::fs::write(hls_dir.join("720p.m3u8"), "#EXTM3U\n720p_000.ts\n").await?;
        tokio::fs::write(hls_dir.join("720p_000.ts"), b"segment").await?;

        let thumbnail = work_dir.join("thumbnail.jpg");
        tokio::fs::write(&thumbnail, b"jpeg").await?;

        Ok(TranscodeOutput {
            hls_dir,
            thumbnail: Some(thumbnail),
        })
    }
}
