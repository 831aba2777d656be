//! Part transfer to a signed URL.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::TransferError;

#[async_trait]
pub trait PartTransport: Send + Sync {
    /// PUT `body` to `url` and return the ETag the store assigned, quotes
    /// stripped.
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, TransferError>;
}

/// Plain HTTPS PUT, as S3 and the local storage routes both expect.
#[derive(Clone, Debug)]
pub struct HttpPartTransport {
    client: Client,
}

impl HttpPartTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

/// Classify a failed PUT. S3 reports an expired presigned URL as a 403 whose
/// body says "Request has expired"; the local store answers 410.
pub fn classify_failure(status: StatusCode, body: &str) -> TransferError {
    if status == StatusCode::GONE
        || (status == StatusCode::FORBIDDEN && body.contains("Request has expired"))
    {
        return TransferError::Expired;
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return TransferError::Transient(format!("status {}", status));
    }
    TransferError::Rejected {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    }
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, TransferError> {
        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
            .ok_or(TransferError::MissingETag)
    }
}
