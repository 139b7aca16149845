//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, feed, generate, health, profile, stream};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent generation requests. Each one holds a provider job open
/// for up to the poll timeout.
const GENERATE_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /blobs/*` - Stored artifact images
/// - `GET /v1/feed` - Feed listing (signed-in callers also get their likes)
/// - `GET /v1/feed/stream` - Change events over WebSocket
///
/// ## Signed in
/// - `POST /generate` - Generate an emoji (spends one credit)
/// - `POST /v1/profile` - Get profile, creating the credit account on first call
/// - `GET /v1/credits/balance` - Current balance
/// - `PUT /v1/feed/:id/like` / `DELETE /v1/feed/:id/like` - Like / unlike
///
/// ## Admin
/// - `POST /v1/credits/add` - Grant credits
/// - `DELETE /v1/feed/:id` - Soft delete
/// - `DELETE /v1/feed/:id/purge` - Hard delete
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let blob_dir = state.config.blob_dir.clone();

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let generate_routes = Router::new()
        .route("/generate", post(generate::generate))
        .layer(ConcurrencyLimitLayer::new(GENERATE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Profile & credits
        .route("/profile", post(profile::ensure_profile))
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/add", post(credits::admin_add_credits))
        // Feed
        .route("/feed", get(feed::list_feed))
        .route("/feed/:id", delete(feed::soft_delete))
        .route("/feed/:id/like", put(feed::like).delete(feed::unlike))
        .route("/feed/:id/purge", delete(feed::purge))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    // Spans carry the path only; the stream route takes its token in the query.
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
                version = ?request.version()
            )
        });

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // Change stream (long-lived, outside the request limits)
        .route(stream::STREAM_PATH, get(stream::stream))
        .merge(generate_routes)
        .nest("/v1", api_routes)
        .nest_service("/blobs", ServeDir::new(blob_dir))
        // Global middleware
        .layer(trace_layer)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
