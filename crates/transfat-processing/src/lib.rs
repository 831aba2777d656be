//! Transfat media processing
//!
//! Converts a finished upload into HLS renditions and a thumbnail.
//! [`TranscodePipeline`] owns the download, transcode, publish and finalize
//! stages; the encoder itself sits behind the [`Transcoder`] trait so the
//! pipeline runs without ffmpeg in tests.

pub mod hls;
pub mod pipeline;
pub mod transcoder;

pub use hls::{content_type_for, master_playlist, HlsConfig, Rendition};
pub use pipeline::{TranscodeOutcome, TranscodePipeline};
pub use transcoder::{FFmpegService, TranscodeOutput, Transcoder};
