//! Test helpers: build AppState and router for integration tests.
//!
//! Every app gets its own temp directory for local storage and in-memory
//! metadata stores, so tests run in parallel without Docker or Postgres.
//! Run with `cargo test -p transfat-api`.

pub mod auth;
pub mod transcoder;
pub mod workflows;

use axum_test::TestServer;
use std::sync::Arc;
use tempfile::TempDir;
use transfat_api::constants;
use transfat_api::setup::{database::MetadataStores, routes, services, storage};
use transfat_api::state::AppState;
use transfat_core::{BaseConfig, Config, MetadataBackend, StorageBackend, TransfatConfig};

pub const PUBLIC_BASE_URL: &str = "http://localhost:4000";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-test-jwt-secret-0123";
pub const TEST_SIGNING_SECRET: &str = "test-signing-secret-test-signing-0123";

/// Small enough that a few kilobytes make a multi-part upload.
pub const TEST_CHUNK_SIZE: u64 = 1024;
pub const TEST_MAX_UPLOAD_SIZE: u64 = 64 * 1024;

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Turn an absolute signed URL into the path-and-query the test server serves.
pub fn local_path(url: &str) -> String {
    url.strip_prefix(PUBLIC_BASE_URL)
        .unwrap_or_else(|| panic!("URL {} is not served by this app", url))
        .to_string()
}

/// Test application: server, state and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_config(temp_dir: &TempDir) -> TransfatConfig {
    TransfatConfig {
        base: BaseConfig {
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 5,
            db_timeout_seconds: 5,
            jwt_secret: TEST_JWT_SECRET.to_string(),
            environment: "test".to_string(),
            log_format: "compact".to_string(),
        },
        metadata_backend: MetadataBackend::Memory,
        database_url: None,
        storage_backend: StorageBackend::Local,
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        aws_region: None,
        local_storage_path: Some(temp_dir.path().join("objects").display().to_string()),
        public_base_url: PUBLIC_BASE_URL.to_string(),
        url_signing_secret: TEST_SIGNING_SECRET.to_string(),
        max_upload_size_bytes: TEST_MAX_UPLOAD_SIZE,
        chunk_size_bytes: TEST_CHUNK_SIZE,
        allowed_content_type_prefix: "video/".to_string(),
        part_url_expiry_secs: 3600,
        manifest_url_expiry_secs: 3600,
        ffmpeg_path: "ffmpeg".to_string(),
        hls_segment_duration: 10,
        hls_renditions: vec!["720p".to_string()],
        thumbnail_offset_secs: 1,
        scratch_dir: Some(temp_dir.path().join("scratch").display().to_string()),
        worker_enabled: false,
        task_queue_max_workers: 1,
        task_queue_poll_interval_ms: 50,
        task_queue_default_timeout_seconds: 60,
        task_queue_max_retries: 3,
        task_queue_stale_task_reap_interval_secs: 0,
        task_queue_stale_task_grace_period_secs: 60,
        shutdown_drain_timeout_secs: 5,
    }
}

/// App with the transcode worker off: completed uploads stay PENDING.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}).await
}

/// App whose worker transcodes with [`transcoder::StubTranscoder`].
pub async fn setup_test_app_with_worker() -> TestApp {
    setup_test_app_with(|c| c.worker_enabled = true).await
}

pub async fn setup_test_app_with(customize: impl FnOnce(&mut TransfatConfig)) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut inner = test_config(&temp_dir);
    customize(&mut inner);
    let config = Config(Box::new(inner));

    let storage = storage::setup_storage(&config)
        .await
        .expect("Failed to set up local storage");

    let state = services::build_state(
        config.clone(),
        MetadataStores::in_memory(),
        storage,
        transcoder::StubTranscoder::new(),
    );
    if config.worker_enabled() {
        services::start_worker(&state);
    }

    let router = routes::setup_routes(&config, state.clone()).expect("Failed to build routes");
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        state,
        _temp_dir: temp_dir,
    }
}
