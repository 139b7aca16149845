//! Feed handlers: listing, likes and moderation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use emoji_core::{EmojiArtifact, FeedPage, Identity, LikeReceipt};

use super::parse_artifact_id;
use crate::auth::{AdminUser, AuthUser, OptionalAuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// List the feed, newest first.
///
/// Admins also receive soft-deleted entries. `liked_ids` is empty for anonymous
/// callers.
pub async fn list_feed(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(identity): OptionalAuthUser,
) -> Result<Json<FeedPage>, ApiError> {
    let admin = identity.as_ref().is_some_and(Identity::is_admin);

    // Stamp first: anything committed after the listing carries a later stamp.
    let as_of = state.store.changes().stamp();
    let artifacts = state.store.list_artifacts(admin)?;

    let mut liked_ids: Vec<_> = match &identity {
        Some(identity) => state
            .store
            .liked_artifact_ids(&identity.user_id)?
            .into_iter()
            .collect(),
        None => Vec::new(),
    };
    liked_ids.sort();

    Ok(Json(FeedPage {
        artifacts,
        liked_ids,
        as_of,
    }))
}

/// Like an artifact. Repeating the call is harmless.
pub async fn like(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LikeReceipt>, ApiError> {
    let artifact_id = parse_artifact_id(&id)?;
    let receipt = state.store.like(auth.user_id(), &artifact_id)?;
    tracing::debug!(user_id = %auth.user_id(), artifact_id = %artifact_id, likes = receipt.likes_count, "Liked");
    Ok(Json(receipt))
}

/// Remove a like. Repeating the call is harmless.
pub async fn unlike(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LikeReceipt>, ApiError> {
    let artifact_id = parse_artifact_id(&id)?;
    let receipt = state.store.unlike(auth.user_id(), &artifact_id)?;
    tracing::debug!(user_id = %auth.user_id(), artifact_id = %artifact_id, likes = receipt.likes_count, "Unliked");
    Ok(Json(receipt))
}

/// Soft-delete an artifact (admin only).
pub async fn soft_delete(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<EmojiArtifact>, ApiError> {
    let artifact_id = parse_artifact_id(&id)?;
    let artifact = state.store.soft_delete_artifact(&artifact_id)?;
    tracing::info!(admin_id = %admin.identity.user_id, artifact_id = %artifact_id, "Artifact soft-deleted");
    Ok(Json(artifact))
}

/// Remove an artifact and its likes permanently (admin only).
pub async fn purge(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<EmojiArtifact>, ApiError> {
    let artifact_id = parse_artifact_id(&id)?;
    let artifact = state.store.purge_artifact(&artifact_id)?;
    tracing::info!(admin_id = %admin.identity.user_id, artifact_id = %artifact_id, "Artifact purged");
    Ok(Json(artifact))
}
