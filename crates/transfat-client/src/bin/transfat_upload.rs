//! transfat-upload: push one file through the resumable upload flow.
//!
//! Set TRANSFAT_TOKEN and TRANSFAT_API_URL. Ctrl-C cancels the upload and
//! tells the API.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use transfat_client::source::guess_content_type;
use transfat_client::{
    init_tracing, ApiClient, ControllerConfig, HttpPartTransport, PartSource, UploadController,
    UploadError,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "transfat-upload", about = "Resumable video upload")]
struct Cli {
    /// Path to the file to upload
    file: PathBuf,
    /// Content type sent to the API (guessed from the extension otherwise)
    #[arg(long)]
    content_type: Option<String>,
    /// File name sent to the API (defaults to the file's own name)
    #[arg(long)]
    name: Option<String>,
    /// Attempts per part before giving up
    #[arg(long, default_value = "3")]
    max_part_attempts: u32,
    /// Timeout for a single part PUT, in seconds
    #[arg(long, default_value = "300")]
    part_timeout: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Outcome {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_upload_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    part_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize outcome")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let api = ApiClient::from_env()
        .context("Failed to create API client. Set TRANSFAT_TOKEN and TRANSFAT_API_URL")?;
    let transport = HttpPartTransport::new(Duration::from_secs(cli.part_timeout))?;
    let source = PartSource::open(&cli.file)
        .await
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;

    let file_name = match cli.name {
        Some(name) => name,
        None => cli
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("File path has no file name")?,
    };
    let content_type = cli
        .content_type
        .unwrap_or_else(|| guess_content_type(&cli.file).to_string());

    let controller = Arc::new(UploadController::new(
        Arc::new(api),
        Arc::new(transport),
        ControllerConfig {
            max_part_attempts: cli.max_part_attempts,
            ..Default::default()
        },
    ));

    let mut progress = controller.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow();
            tracing::info!(
                completed = p.completed_parts,
                total = p.total_parts,
                "Progress {:.0}%",
                p.fraction() * 100.0
            );
        }
    });

    let canceller = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling upload");
                controller.cancel().await;
            }
        })
    };

    let result = controller.start(source, &file_name, &content_type).await;
    canceller.abort();
    reporter.abort();

    let state = controller.state().await;
    let outcome = match result {
        Ok(done) => Outcome {
            status: state.to_string(),
            video_upload_id: Some(done.video_upload_id),
            upload_id: Some(done.upload_id),
            part_count: Some(done.part_count),
            error: None,
        },
        Err(err) => Outcome {
            status: state.to_string(),
            video_upload_id: None,
            upload_id: controller.upload_id().await,
            part_count: None,
            error: match err {
                UploadError::Cancelled => None,
                other => Some(other.to_string()),
            },
        },
    };
    print_json(&outcome)?;

    if outcome.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}
