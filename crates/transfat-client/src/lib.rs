//! Transfat upload client
//!
//! Drives one resumable multipart upload per [`UploadController`]: initiate
//! with the API, push each part straight to object storage through a signed
//! URL, then ask the API to complete. Pause, resume and cancel take effect at
//! part boundaries.
//!
//! The API and the part transfer sit behind the [`UploadCoordinatorApi`] and
//! [`PartTransport`] traits so the controller can be driven by fakes in tests.

pub mod api;
pub mod controller;
pub mod error;
pub mod manager;
pub mod source;
pub mod transport;

pub use api::{ApiClient, UploadCoordinatorApi};
pub use controller::{ControllerConfig, ControllerState, Progress, UploadController, UploadOutcome};
pub use error::{TransferError, UploadError};
pub use manager::UploadManager;
pub use source::PartSource;
pub use transport::{HttpPartTransport, PartTransport};

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}
