//! Signed-URL targets for the local storage backend.
//!
//! The local store mints URLs pointing here instead of at S3. Expired URLs
//! answer 410 and bad signatures 403, so a client can tell "ask for a fresh
//! URL" apart from "this URL was never valid".

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use transfat_processing::content_type_for;
use transfat_storage::{LocalObjectStore, ObjectStore, StorageError};

#[derive(Debug, Deserialize)]
pub struct PartUploadParams {
    pub key: String,
    pub expires: i64,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectParams {
    pub expires: i64,
    pub signature: String,
}

fn local_store(state: &AppState) -> Result<&Arc<LocalObjectStore>, Response> {
    state.storage.local.as_ref().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Local storage is not enabled",
                "NOT_FOUND",
            )),
        )
            .into_response()
    })
}

fn storage_failure(err: StorageError) -> Response {
    match err {
        StorageError::Expired => (
            StatusCode::GONE,
            Json(
                ErrorResponse::new("Signed URL has expired", "URL_EXPIRED")
                    .with_suggested_action("Request a fresh URL"),
            ),
        )
            .into_response(),
        StorageError::InvalidSignature => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(
                "Signed URL signature is invalid",
                "INVALID_SIGNATURE",
            )),
        )
            .into_response(),
        other => HttpAppError::from(other).into_response(),
    }
}

pub async fn put_part(
    State(state): State<Arc<AppState>>,
    Path((upload_id, part_number)): Path<(String, i32)>,
    Query(params): Query<PartUploadParams>,
    body: Bytes,
) -> Response {
    let store = match local_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    if let Err(e) = store.verify_part_signature(
        &params.key,
        &upload_id,
        part_number,
        params.expires,
        &params.signature,
    ) {
        tracing::debug!(upload_id = %upload_id, part_number, error = %e, "Rejected part upload");
        return storage_failure(e);
    }

    match store
        .write_part(&params.key, &upload_id, part_number, body)
        .await
    {
        Ok(etag) => (
            StatusCode::OK,
            [(header::ETAG, format!("\"{}\"", etag))],
        )
            .into_response(),
        Err(e) => storage_failure(e),
    }
}

pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<ObjectParams>,
) -> Response {
    let store = match local_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    if let Err(e) = store.verify_get_signature(&key, params.expires, &params.signature) {
        return storage_failure(e);
    }

    let stream = match store.get_object(&key).await {
        Ok(stream) => stream,
        Err(e) => return storage_failure(e),
    };

    let body_stream = stream.map(|result| {
        result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(FsPath::new(&key)))],
        Body::from_stream(body_stream),
    )
        .into_response()
}
