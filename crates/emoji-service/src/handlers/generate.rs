//! Emoji generation handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use emoji_core::{EmojiArtifact, GenerationError};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// What the emoji should show.
    #[serde(default)]
    pub prompt: String,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Public image URL.
    pub url: String,
    /// The recorded feed entry.
    pub artifact: EmojiArtifact,
}

/// Generate an emoji, spending one credit on success.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let orchestrator = state
        .orchestrator
        .as_ref()
        .ok_or(GenerationError::ProviderUnavailable)?;

    let artifact = orchestrator.generate(auth.user_id(), &body.prompt).await?;

    Ok(Json(GenerateResponse {
        url: artifact.image_url.clone(),
        artifact,
    }))
}
