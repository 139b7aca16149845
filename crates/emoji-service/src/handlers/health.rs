//! Health check handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Whether an inference provider is configured.
    pub generation_available: bool,
    /// Live change-feed subscribers.
    pub feed_subscribers: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "emoji".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation_available: state.has_provider(),
        feed_subscribers: state.store.changes().subscriber_count(),
    })
}
