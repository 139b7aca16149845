//! Emoji artifacts, like edges, and the feed views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArtifactId, UserId};

/// A generated emoji persisted in the shared feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiArtifact {
    /// Artifact ID.
    pub id: ArtifactId,

    /// Publicly readable image URL.
    pub image_url: String,

    /// The prompt the user typed (without provider-specific decoration).
    pub prompt: String,

    /// The user who generated the artifact.
    pub creator_id: UserId,

    /// Number of like edges referencing this artifact.
    pub likes_count: i64,

    /// Soft-delete flag. Deleted artifacts are only visible to admins.
    pub deleted: bool,

    /// When the artifact row was created.
    pub created_at: DateTime<Utc>,
}

impl EmojiArtifact {
    /// Build a fresh artifact row from an insert request.
    #[must_use]
    pub fn from_new(new: NewArtifact) -> Self {
        Self {
            id: ArtifactId::generate(),
            image_url: new.image_url,
            prompt: new.prompt,
            creator_id: new.creator_id,
            likes_count: 0,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    /// Whether a viewer with the given capability may see this artifact.
    #[must_use]
    pub fn visible_to(&self, admin: bool) -> bool {
        admin || !self.deleted
    }
}

/// Fields supplied when inserting an artifact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArtifact {
    /// Publicly readable image URL.
    pub image_url: String,
    /// User prompt.
    pub prompt: String,
    /// Creator.
    pub creator_id: UserId,
}

/// A like from one user on one artifact. At most one edge exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeEdge {
    /// The liking user.
    pub user_id: UserId,
    /// The liked artifact.
    pub artifact_id: ArtifactId,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

impl LikeEdge {
    /// Create an edge stamped with the current time.
    #[must_use]
    pub fn new(user_id: UserId, artifact_id: ArtifactId) -> Self {
        Self {
            user_id,
            artifact_id,
            created_at: Utc::now(),
        }
    }
}

/// Authoritative result of a like or unlike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeReceipt {
    /// The artifact.
    pub artifact_id: ArtifactId,
    /// Whether the caller's edge exists after the operation.
    pub liked: bool,
    /// Like count recomputed from the edges.
    pub likes_count: i64,
    /// Store timestamp of the operation.
    pub observed_at: DateTime<Utc>,
}

/// One load of the feed for a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    /// Artifacts, newest first.
    pub artifacts: Vec<EmojiArtifact>,
    /// Artifacts the viewer has liked.
    pub liked_ids: Vec<ArtifactId>,
    /// Store timestamp the page reflects.
    pub as_of: DateTime<Utc>,
}

/// Sort artifacts newest first, breaking ties by ID so the order is stable.
pub fn sort_newest_first(artifacts: &mut [EmojiArtifact]) {
    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn artifact(prompt: &str) -> EmojiArtifact {
        EmojiArtifact::from_new(NewArtifact {
            image_url: format!("https://cdn.test/{prompt}.png"),
            prompt: prompt.to_string(),
            creator_id: UserId::generate(),
        })
    }

    #[test]
    fn new_artifact_starts_clean() {
        let a = artifact("a cat");
        assert_eq!(a.likes_count, 0);
        assert!(!a.deleted);
        assert!(a.visible_to(false));
    }

    #[test]
    fn deleted_artifacts_are_admin_only() {
        let mut a = artifact("a dog");
        a.deleted = true;
        assert!(!a.visible_to(false));
        assert!(a.visible_to(true));
    }

    #[test]
    fn sorts_newest_first() {
        let mut old = artifact("old");
        old.created_at -= Duration::seconds(10);
        let new = artifact("new");

        let mut all = vec![old.clone(), new.clone()];
        sort_newest_first(&mut all);
        assert_eq!(all[0].id, new.id);
        assert_eq!(all[1].id, old.id);
    }
}
