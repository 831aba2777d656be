mod transcode_handler;

pub use transcode_handler::TranscodeTaskHandler;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::state::AppState;
use transfat_core::models::Task;

/// Trait for task handlers.
///
/// Handlers run on the worker pool. Long external work (ffmpeg) happens in
/// child processes, so handlers stay async and never block the runtime.
#[async_trait]
pub trait TaskHandler {
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value>;
}
