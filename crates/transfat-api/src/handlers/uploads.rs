//! Resumable upload handlers.
//!
//! Thin wrappers over [`UploadCoordinator`](crate::services::upload::UploadCoordinator):
//! extract the caller, validate the request shape, map the result to JSON.

use crate::auth::models::UserContext;
use crate::error::{HttpAppError, ValidatedJson, ValidatedQuery};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use transfat_core::models::{
    CompleteUploadRequest, CompleteUploadResponse, InitiateUploadRequest, InitiateUploadResponse,
    ListUploadsQuery, PartUrlQuery, PartUrlResponse, UpdateStatusRequest, UpdateStatusResponse,
    UploadListResponse,
};
use uuid::Uuid;
use validator::Validate;

#[tracing::instrument(skip(state, request), fields(user_id = %user.user_id, operation = "initiate_upload"))]
pub async fn initiate_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let session = state.uploads.initiate(user.user_id, request).await?;

    Ok(Json(InitiateUploadResponse {
        video_upload_id: session.id,
        part_count: session.part_count(),
        chunk_size: session.chunk_size as u64,
        upload_id: session.upload_id,
        key: session.key,
        status: session.status,
    }))
}

#[tracing::instrument(skip(state, query), fields(user_id = %user.user_id, part_number = query.part_number))]
pub async fn get_part_url(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<PartUrlQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    query.validate().map_err(transfat_core::AppError::from)?;

    let presigned = state
        .uploads
        .issue_part_url(user.user_id, &query.upload_id, query.part_number)
        .await?;

    Ok(Json(PartUrlResponse {
        url: presigned.url,
        part_number: query.part_number,
        expires_at: presigned.expires_at,
    }))
}

#[tracing::instrument(skip(state, request), fields(user_id = %user.user_id, operation = "complete_upload"))]
pub async fn complete_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CompleteUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    request.validate().map_err(transfat_core::AppError::from)?;

    let session = state
        .uploads
        .complete(user.user_id, &request.upload_id, request.parts)
        .await?;

    Ok(Json(CompleteUploadResponse {
        success: true,
        video_upload_id: session.id,
    }))
}

#[tracing::instrument(skip(state, request), fields(user_id = %user.user_id, status = %request.status))]
pub async fn update_upload_status(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    request.validate().map_err(transfat_core::AppError::from)?;

    let session = state
        .uploads
        .update_status(user.user_id, &request.upload_id, request.status)
        .await?;

    Ok(Json(UpdateStatusResponse {
        message: "Status update successful".to_string(),
        status: session.status,
    }))
}

pub async fn list_uploads(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ListUploadsQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (data, pagination) = state.uploads.list_uploads(user.user_id, query).await?;
    Ok(Json(UploadListResponse { data, pagination }))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, video_upload_id = %video_upload_id))]
pub async fn get_manifest(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(video_upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let manifest = state
        .uploads
        .get_manifest(user.user_id, video_upload_id)
        .await?;
    Ok(Json(manifest))
}
