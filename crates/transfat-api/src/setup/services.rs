//! Service wiring
//!
//! Builds [`AppState`] from already-initialized stores. Kept separate from
//! [`super::initialize_app`] so integration tests can assemble the same state
//! around in-memory stores and a stub transcoder.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use transfat_core::Config;
use transfat_processing::{TranscodePipeline, Transcoder};
use transfat_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};

use super::database::MetadataStores;
use crate::services::upload::{UploadCoordinator, UploadSettings};
use crate::state::{AppState, StorageState, TaskState};

pub fn build_state(
    config: Config,
    metadata: MetadataStores,
    storage: StorageState,
    transcoder: Arc<dyn Transcoder>,
) -> Arc<AppState> {
    let queue = TaskQueue::new(metadata.tasks.clone(), TaskQueueConfig::from_config(&config));

    let pipeline = Arc::new(TranscodePipeline::new(
        metadata.sessions.clone(),
        storage.store.clone(),
        transcoder,
        config.scratch_dir().map(PathBuf::from),
    ));

    let uploads = Arc::new(UploadCoordinator::new(
        metadata.sessions.clone(),
        storage.store.clone(),
        queue.clone(),
        UploadSettings::from_config(&config),
    ));

    tracing::info!(
        chunk_size_bytes = config.chunk_size_bytes(),
        max_upload_size_bytes = config.max_upload_size_bytes(),
        "Upload coordinator initialized"
    );

    Arc::new(AppState {
        config,
        pool: metadata.pool,
        sessions: metadata.sessions,
        uploads,
        storage,
        tasks: TaskState { queue, pipeline },
    })
}

/// Start the transcode worker pool with the state as its dispatch context.
/// The queue holds only a weak reference, so dropping the state stops dispatch.
pub fn start_worker(state: &Arc<AppState>) {
    let context: Weak<dyn TaskHandlerContext> = {
        let weak: Weak<AppState> = Arc::downgrade(state);
        weak
    };
    state
        .tasks
        .queue
        .start_workers(context, state.pool.clone(), None);
    tracing::info!(
        max_workers = state.config.task_queue_max_workers(),
        "Transcode worker started"
    );
}
