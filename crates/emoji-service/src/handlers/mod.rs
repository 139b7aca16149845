//! API handlers.

pub mod credits;
pub mod feed;
pub mod generate;
pub mod health;
pub mod profile;
pub mod stream;

use emoji_core::ArtifactId;

use crate::error::ApiError;

/// Parse an artifact ID path segment.
pub(crate) fn parse_artifact_id(raw: &str) -> Result<ArtifactId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid artifact id: {raw}")))
}
