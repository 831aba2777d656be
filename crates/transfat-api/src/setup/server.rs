//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use transfat_core::Config;

use crate::state::AppState;

/// Serve until a shutdown signal, then drain the transcode worker.
pub async fn start_server(config: &Config, app: Router, state: Arc<AppState>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port());
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_upload_mb = config.max_upload_size_bytes() / 1024 / 1024,
        chunk_size_mb = config.chunk_size_bytes() / 1024 / 1024,
        content_type_prefix = %config.allowed_content_type_prefix(),
        public_base_url = %config.public_base_url(),
        ffmpeg_path = %config.ffmpeg_path(),
        worker_enabled = config.worker_enabled(),
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let drain_timeout = Duration::from_secs(config.shutdown_drain_timeout_secs());
    if !state.tasks.queue.shutdown_and_drain(drain_timeout).await {
        tracing::warn!("Exiting with transcodes still running; they will be retried");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM. If a handler cannot be installed
/// that signal is logged and ignored rather than ending the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
