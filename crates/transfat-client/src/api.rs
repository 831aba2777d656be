//! HTTP client for the upload endpoints of the Transfat API.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use transfat_core::models::{
    CompleteUploadRequest, CompleteUploadResponse, InitiateUploadRequest, InitiateUploadResponse,
    PartETag, PartUrlResponse, UpdateStatusRequest, UpdateStatusResponse, UploadStatus,
};

use crate::error::UploadError;

/// Path prefix of the versioned API. Must match the server.
pub const API_PREFIX: &str = "/api/v0";

/// The coordinator operations the controller depends on.
#[async_trait]
pub trait UploadCoordinatorApi: Send + Sync {
    async fn initiate(
        &self,
        request: &InitiateUploadRequest,
    ) -> Result<InitiateUploadResponse, UploadError>;

    async fn part_url(
        &self,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PartUrlResponse, UploadError>;

    async fn complete(
        &self,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<CompleteUploadResponse, UploadError>;

    async fn update_status(
        &self,
        upload_id: &str,
        status: UploadStatus,
    ) -> Result<UpdateStatusResponse, UploadError>;
}

/// Error body the API sends on failure. Only the fields the client reads.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    code: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Reads `TRANSFAT_API_URL` (default `http://localhost:4000`) and
    /// `TRANSFAT_TOKEN`.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("TRANSFAT_API_URL")
            .unwrap_or_else(|_| "http://localhost:4000".to_string());
        let token = std::env::var("TRANSFAT_TOKEN")
            .context("Missing bearer token. Set TRANSFAT_TOKEN")?;
        Self::new(base_url, token)
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, UploadError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| UploadError::api(format!("Request failed: {}", e)))?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, UploadError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, code) = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => (body.error, body.code),
                Err(_) if text.is_empty() => (status.to_string(), None),
                Err(_) => (text, None),
            };
            return Err(UploadError::Api {
                status: Some(status.as_u16()),
                code,
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::api(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl UploadCoordinatorApi for ApiClient {
    async fn initiate(
        &self,
        request: &InitiateUploadRequest,
    ) -> Result<InitiateUploadResponse, UploadError> {
        self.send(self.client.post(self.build_url("/uploads/initiate")).json(request))
            .await
    }

    async fn part_url(
        &self,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PartUrlResponse, UploadError> {
        let url = format!(
            "{}?uploadId={}&partNumber={}",
            self.build_url("/uploads/presigned-url"),
            urlencoding::encode(upload_id),
            part_number
        );
        self.send(self.client.get(url)).await
    }

    async fn complete(
        &self,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<CompleteUploadResponse, UploadError> {
        let body = CompleteUploadRequest {
            upload_id: upload_id.to_string(),
            parts: parts.to_vec(),
        };
        self.send(self.client.post(self.build_url("/uploads/complete")).json(&body))
            .await
    }

    async fn update_status(
        &self,
        upload_id: &str,
        status: UploadStatus,
    ) -> Result<UpdateStatusResponse, UploadError> {
        let body = UpdateStatusRequest {
            upload_id: upload_id.to_string(),
            status,
        };
        self.send(self.client.patch(self.build_url("/uploads/status")).json(&body))
            .await
    }
}
