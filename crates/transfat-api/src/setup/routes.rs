//! Route configuration and setup

use crate::auth::middleware::{auth_middleware, AuthState};
use crate::constants::{API_PREFIX, JSON_BODY_LIMIT_BYTES, STORAGE_PREFIX};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use transfat_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Headroom over the chunk size for a part body.
const PART_BODY_MARGIN_BYTES: usize = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;
    let auth_state = Arc::new(AuthState::new(config.jwt_secret()));

    let protected = protected_routes()
        .layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT_BYTES));

    let part_limit = usize::try_from(config.chunk_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(PART_BODY_MARGIN_BYTES);

    let app = Router::new()
        .nest(API_PREFIX, protected)
        .nest(STORAGE_PREFIX, storage_routes(part_limit))
        .merge(public_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };

    // Browsers hide ETag from scripts unless it is exposed; the client needs it to complete.
    Ok(cors.expose_headers([header::ETAG]))
}

/// Public routes (no authentication required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::liveness_check))
        .route("/live", get(handlers::health::liveness_check))
        .route("/ready", get(handlers::health::readiness_check))
}

/// Upload routes; the caller comes from the bearer token.
fn protected_routes() -> Router<Arc<AppState>> {
    use handlers::uploads;

    Router::new()
        .route("/uploads", get(uploads::list_uploads))
        .route("/uploads/initiate", post(uploads::initiate_upload))
        .route("/uploads/presigned-url", get(uploads::get_part_url))
        .route("/uploads/complete", post(uploads::complete_upload))
        .route("/uploads/status", patch(uploads::update_upload_status))
        .route(
            "/uploads/{video_upload_id}/manifest",
            get(uploads::get_manifest),
        )
}

/// Signed-URL targets of the local backend. The signature is the credential.
fn storage_routes(part_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/parts/{upload_id}/{part_number}",
            put(handlers::storage::put_part),
        )
        .route("/objects/{*key}", get(handlers::storage::get_object))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(part_limit))
}
