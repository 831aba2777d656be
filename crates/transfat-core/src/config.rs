//! Configuration module
//!
//! Everything is read from the environment (optionally seeded from `.env`).
//! Required values fail fast with an error naming the variable; optional
//! values fall back to the constants below when absent or unparsable.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_ALLOWED_CONTENT_TYPE_PREFIX, DEFAULT_CHUNK_SIZE_BYTES,
    DEFAULT_MANIFEST_URL_EXPIRY_SECS, DEFAULT_PART_URL_EXPIRY_SECS, MIN_CHUNK_SIZE_BYTES,
    TRANSCODE_MAX_ATTEMPTS,
};
use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Where upload sessions and tasks are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Postgres,
    /// Process-local maps. Nothing survives a restart.
    Memory,
}

impl FromStr for MetadataBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(MetadataBackend::Postgres),
            "memory" => Ok(MetadataBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid metadata backend: {}", s)),
        }
    }
}

impl fmt::Display for MetadataBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataBackend::Postgres => write!(f, "postgres"),
            MetadataBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Server-level settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub environment: String,
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct TransfatConfig {
    pub base: BaseConfig,
    pub metadata_backend: MetadataBackend,
    pub database_url: Option<String>,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub public_base_url: String,
    pub url_signing_secret: String,
    // Upload limits
    pub max_upload_size_bytes: u64,
    pub chunk_size_bytes: u64,
    pub allowed_content_type_prefix: String,
    pub part_url_expiry_secs: u64,
    pub manifest_url_expiry_secs: u64,
    // Transcoding
    pub ffmpeg_path: String,
    pub hls_segment_duration: u64,
    pub hls_renditions: Vec<String>,
    pub thumbnail_offset_secs: u64,
    pub scratch_dir: Option<String>,
    // Task queue configuration
    pub worker_enabled: bool,
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_queue_default_timeout_seconds: i32,
    pub task_queue_max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub task_queue_stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub task_queue_stale_task_grace_period_secs: i64,
    pub shutdown_drain_timeout_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<TransfatConfig>);

impl Config {
    fn inner(&self) -> &TransfatConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.inner().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = TransfatConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_json(&self) -> bool {
        self.inner().base.log_format.eq_ignore_ascii_case("json")
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn metadata_backend(&self) -> MetadataBackend {
        self.inner().metadata_backend
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().database_url.as_deref()
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    /// S3 region, falling back to `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        self.inner()
            .s3_region
            .as_deref()
            .or(self.inner().aws_region.as_deref())
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn public_base_url(&self) -> &str {
        &self.inner().public_base_url
    }

    pub fn url_signing_secret(&self) -> &str {
        &self.inner().url_signing_secret
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.inner().max_upload_size_bytes
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.inner().chunk_size_bytes
    }

    pub fn allowed_content_type_prefix(&self) -> &str {
        &self.inner().allowed_content_type_prefix
    }

    pub fn part_url_expiry_secs(&self) -> u64 {
        self.inner().part_url_expiry_secs
    }

    pub fn manifest_url_expiry_secs(&self) -> u64 {
        self.inner().manifest_url_expiry_secs
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.inner().ffmpeg_path
    }

    pub fn hls_segment_duration(&self) -> u64 {
        self.inner().hls_segment_duration
    }

    pub fn hls_renditions(&self) -> &[String] {
        &self.inner().hls_renditions
    }

    pub fn thumbnail_offset_secs(&self) -> u64 {
        self.inner().thumbnail_offset_secs
    }

    pub fn scratch_dir(&self) -> Option<&str> {
        self.inner().scratch_dir.as_deref()
    }

    pub fn worker_enabled(&self) -> bool {
        self.inner().worker_enabled
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.inner().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.inner().task_queue_poll_interval_ms
    }

    pub fn task_queue_default_timeout_seconds(&self) -> i32 {
        self.inner().task_queue_default_timeout_seconds
    }

    pub fn task_queue_max_retries(&self) -> i32 {
        self.inner().task_queue_max_retries
    }

    pub fn task_queue_stale_task_reap_interval_secs(&self) -> u64 {
        self.inner().task_queue_stale_task_reap_interval_secs
    }

    pub fn task_queue_stale_task_grace_period_secs(&self) -> i64 {
        self.inner().task_queue_stale_task_grace_period_secs
    }

    pub fn shutdown_drain_timeout_secs(&self) -> u64 {
        self.inner().shutdown_drain_timeout_secs
    }
}

pub fn is_production_env(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn env_or<T: FromStr + ToString>(name: &str, default: T) -> T {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl TransfatConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_UPLOAD_SIZE_MB: u64 = 5 * 1024;
        const HLS_SEGMENT_DURATION: u64 = 10;
        const THUMBNAIL_OFFSET_SECS: u64 = 5;
        const TASK_QUEUE_MAX_WORKERS: usize = 2;
        const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const TASK_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 3600;
        const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;
        const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 30;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_env(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?;

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let base = BaseConfig {
            server_port,
            cors_origins,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            jwt_secret: jwt_secret.clone(),
            environment,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        };

        let metadata_backend = match env_opt("METADATA_BACKEND") {
            Some(v) => v.parse()?,
            None => MetadataBackend::Postgres,
        };
        let database_url = env_opt("DATABASE_URL");
        if metadata_backend == MetadataBackend::Postgres && database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be set when METADATA_BACKEND=postgres"
            ));
        }

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(v) => v.parse()?,
            None => StorageBackend::S3,
        };

        let public_base_url = env_opt("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", base.server_port))
            .trim_end_matches('/')
            .to_string();

        let hls_renditions = env::var("HLS_RENDITIONS")
            .unwrap_or_else(|_| "720p,480p".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let chunk_size_bytes =
            env_or("UPLOAD_CHUNK_SIZE_BYTES", DEFAULT_CHUNK_SIZE_BYTES).max(MIN_CHUNK_SIZE_BYTES);

        Ok(TransfatConfig {
            base,
            metadata_backend,
            database_url,
            storage_backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            aws_region: env_opt("AWS_REGION"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            public_base_url,
            url_signing_secret: env_opt("URL_SIGNING_SECRET").unwrap_or(jwt_secret),
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB) * 1024 * 1024,
            chunk_size_bytes,
            allowed_content_type_prefix: env::var("ALLOWED_CONTENT_TYPE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPE_PREFIX.to_string()),
            part_url_expiry_secs: env_or("PART_URL_EXPIRY_SECS", DEFAULT_PART_URL_EXPIRY_SECS),
            manifest_url_expiry_secs: env_or(
                "MANIFEST_URL_EXPIRY_SECS",
                DEFAULT_MANIFEST_URL_EXPIRY_SECS,
            ),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            hls_segment_duration: env_or("HLS_SEGMENT_DURATION", HLS_SEGMENT_DURATION),
            hls_renditions,
            thumbnail_offset_secs: env_or("THUMBNAIL_OFFSET_SECS", THUMBNAIL_OFFSET_SECS),
            scratch_dir: env_opt("SCRATCH_DIR"),
            worker_enabled: env_or("WORKER_ENABLED", true),
            task_queue_max_workers: env_or("TASK_QUEUE_MAX_WORKERS", TASK_QUEUE_MAX_WORKERS),
            task_queue_poll_interval_ms: env_or(
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            ),
            task_queue_default_timeout_seconds: env_or(
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                TASK_QUEUE_DEFAULT_TIMEOUT_SECS,
            ),
            task_queue_max_retries: env_or("TASK_QUEUE_MAX_RETRIES", TRANSCODE_MAX_ATTEMPTS),
            task_queue_stale_task_reap_interval_secs: env_or(
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                STALE_TASK_REAP_INTERVAL_SECS,
            ),
            task_queue_stale_task_grace_period_secs: env_or(
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                STALE_TASK_GRACE_PERIOD_SECS,
            ),
            shutdown_drain_timeout_secs: env_or(
                "SHUTDOWN_DRAIN_TIMEOUT_SECS",
                SHUTDOWN_DRAIN_TIMEOUT_SECS,
            ),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if self.metadata_backend == MetadataBackend::Postgres {
            let url = self.database_url.as_deref().unwrap_or_default();
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.hls_renditions.is_empty() {
            return Err(anyhow::anyhow!(
                "HLS_RENDITIONS must list at least one rendition"
            ));
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }

        // A task still running past timeout + grace is presumed dead.
        if self.task_queue_stale_task_grace_period_secs < 0 {
            return Err(anyhow::anyhow!(
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS must not be negative"
            ));
        }

        Ok(())
    }
}
