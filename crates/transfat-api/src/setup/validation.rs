//! Configuration validation
//!
//! Checks that depend on the process environment rather than on a single
//! value; per-field checks live in `TransfatConfig::validate`.

use anyhow::Result;
use transfat_core::{Config, StorageBackend};

pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    let is_production = config.is_production();
    let env_var = std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .ok();

    if is_production && env_var.is_none() {
        tracing::warn!(
            "Production mode detected but ENVIRONMENT/APP_ENV not set - error details may leak"
        );
    }

    if is_production && config.cors_origins().iter().any(|o| o == "*") {
        return Err(anyhow::anyhow!(
            "CORS configured to allow all origins (*) in production. \
            Set explicit origins via CORS_ORIGINS."
        ));
    }

    if config.db_max_connections() == 0 {
        return Err(anyhow::anyhow!("Database max connections cannot be 0"));
    }

    if config.db_timeout_seconds() == 0 {
        return Err(anyhow::anyhow!("Database timeout cannot be 0"));
    }

    if config.chunk_size_bytes() > config.max_upload_size_bytes() {
        tracing::warn!(
            chunk_size_bytes = config.chunk_size_bytes(),
            max_upload_size_bytes = config.max_upload_size_bytes(),
            "Chunk size exceeds the upload limit; every upload will be a single part"
        );
    }

    if config.storage_backend() == StorageBackend::Local
        && config.url_signing_secret() == config.jwt_secret()
    {
        tracing::warn!("URL_SIGNING_SECRET not set, signing local storage URLs with JWT_SECRET");
    }

    Ok(())
}
