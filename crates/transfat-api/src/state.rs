//! Application state and sub-states.
//!
//! Handlers reach the part of the state they need through the sub-state
//! fields; the task dispatcher reaches the transcode pipeline the same way.

use std::sync::Arc;

use sqlx::PgPool;
use transfat_core::Config;
use transfat_db::UploadSessionStore;
use transfat_processing::TranscodePipeline;
use transfat_storage::{LocalObjectStore, ObjectStore};
use transfat_worker::TaskQueue;

use crate::services::upload::UploadCoordinator;

/// The configured object store, plus the concrete local store when that
/// backend is active so its signed-URL routes can be served.
#[derive(Clone)]
pub struct StorageState {
    pub store: Arc<dyn ObjectStore>,
    pub local: Option<Arc<LocalObjectStore>>,
}

/// Queue handle and the pipeline the worker runs.
#[derive(Clone)]
pub struct TaskState {
    pub queue: TaskQueue,
    pub pipeline: Arc<TranscodePipeline>,
}

pub struct AppState {
    pub config: Config,
    /// Present with the Postgres metadata backend only.
    pub pool: Option<PgPool>,
    pub sessions: Arc<dyn UploadSessionStore>,
    pub uploads: Arc<UploadCoordinator>,
    pub storage: StorageState,
    pub tasks: TaskState,
}
