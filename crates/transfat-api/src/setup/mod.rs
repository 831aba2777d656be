//! Application setup and initialization
//!
//! Everything `main.rs` needs to go from a [`Config`] to a running router,
//! split so tests can assemble the same state around in-memory backends.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;
pub mod validation;

use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use transfat_core::Config;
use transfat_processing::{FFmpegService, HlsConfig, Transcoder};

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    validation::validate_config(&config).context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_json())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        metadata_backend = %config.metadata_backend(),
        storage_backend = %config.storage_backend(),
        "Configuration loaded and validated successfully"
    );

    let metadata = database::setup_metadata(&config).await?;
    let storage = storage::setup_storage(&config).await?;

    let hls = HlsConfig::from_config(&config).context("Invalid HLS configuration")?;
    let transcoder: Arc<dyn Transcoder> =
        Arc::new(FFmpegService::new(config.ffmpeg_path().to_string(), hls));

    let state = services::build_state(config.clone(), metadata, storage, transcoder);

    if config.worker_enabled() {
        services::start_worker(&state);
    } else {
        tracing::info!("Transcode worker disabled on this node");
    }

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
