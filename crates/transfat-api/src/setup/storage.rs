//! Storage setup and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use transfat_core::{Config, StorageBackend};
use transfat_storage::{create_object_store, LocalObjectStore, ObjectStore};

use crate::state::StorageState;

/// Build the configured object store. With the local backend the concrete
/// store is kept as well, since the server has to answer its signed URLs.
pub async fn setup_storage(config: &Config) -> Result<StorageState> {
    tracing::info!("Initializing object storage...");

    let state = match config.storage_backend() {
        StorageBackend::Local => {
            let base_path = config
                .local_storage_path()
                .context("LOCAL_STORAGE_PATH must be set when using local storage backend")?;
            let local = Arc::new(
                LocalObjectStore::new(
                    base_path,
                    config.public_base_url().to_string(),
                    config.url_signing_secret(),
                )
                .await?,
            );
            StorageState {
                store: local.clone() as Arc<dyn ObjectStore>,
                local: Some(local),
            }
        }
        StorageBackend::S3 => StorageState {
            store: create_object_store(config).await?,
            local: None,
        },
    };

    tracing::info!(
        backend = %state.store.backend_type(),
        bucket = %state.store.bucket(),
        "Object storage initialized successfully"
    );

    Ok(state)
}
