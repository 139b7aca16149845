//! Key encoding for the `RocksDB` column families.
//!
//! User IDs are variable length and never contain a NUL byte, so a NUL separator
//! terminates the user segment in composite keys. Artifact IDs are 16 raw bytes.

use emoji_core::{ArtifactId, ReservationId, UserId};

const SEPARATOR: u8 = 0x00;

/// Key for an account record.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_str().as_bytes().to_vec()
}

/// Key for a reservation record.
#[must_use]
pub fn reservation_key(id: &ReservationId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key for an artifact row.
#[must_use]
pub fn artifact_key(id: &ArtifactId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Prefix shared by every like edge of one user.
#[must_use]
pub fn user_likes_prefix(user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.as_str().len() + 1);
    key.extend_from_slice(user_id.as_str().as_bytes());
    key.push(SEPARATOR);
    key
}

/// Key for a like edge: `user_id || 0x00 || artifact_id`.
#[must_use]
pub fn like_key(user_id: &UserId, artifact_id: &ArtifactId) -> Vec<u8> {
    let mut key = user_likes_prefix(user_id);
    key.extend_from_slice(artifact_id.as_bytes());
    key
}

/// Key for the by-artifact index: `artifact_id || user_id`.
#[must_use]
pub fn artifact_like_key(artifact_id: &ArtifactId, user_id: &UserId) -> Vec<u8> {
    let mut key = artifact_id.as_bytes().to_vec();
    key.extend_from_slice(user_id.as_str().as_bytes());
    key
}

/// Extract the artifact ID from a like edge key.
///
/// Returns `None` if the key is not a well-formed edge key.
#[must_use]
pub fn artifact_id_from_like_key(key: &[u8]) -> Option<ArtifactId> {
    let split = key.iter().position(|b| *b == SEPARATOR)?;
    let bytes: [u8; 16] = key.get(split + 1..)?.try_into().ok()?;
    Some(ArtifactId::from_bytes(bytes))
}
