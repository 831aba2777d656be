//! Metadata store setup
//!
//! Postgres is the production backend; the memory backend keeps sessions and
//! tasks in process and is meant for development and tests.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use transfat_core::{Config, MetadataBackend};
use transfat_db::{
    MemoryTaskStore, MemoryUploadSessionStore, PgTaskRepository, PgUploadSessionRepository,
    TaskStore, UploadSessionStore,
};

/// The stores the rest of the application is built on.
pub struct MetadataStores {
    /// Present with the Postgres backend only.
    pub pool: Option<PgPool>,
    pub sessions: Arc<dyn UploadSessionStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl MetadataStores {
    pub fn in_memory() -> Self {
        Self {
            pool: None,
            sessions: Arc::new(MemoryUploadSessionStore::new()),
            tasks: Arc::new(MemoryTaskStore::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sessions: Arc::new(PgUploadSessionRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }
}

pub async fn setup_metadata(config: &Config) -> Result<MetadataStores> {
    match config.metadata_backend() {
        MetadataBackend::Postgres => {
            let pool = setup_database(config).await?;
            Ok(MetadataStores::postgres(pool))
        }
        MetadataBackend::Memory => {
            if config.is_production() {
                tracing::warn!("In-memory metadata backend in production: uploads are lost on restart");
            }
            Ok(MetadataStores::in_memory())
        }
    }
}

/// Setup database connection pool and run migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url()
        .context("DATABASE_URL must be set when METADATA_BACKEND=postgres")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Run pending migrations on startup (path: workspace migrations/ from crate root)
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
