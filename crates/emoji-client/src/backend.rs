//! The calls a feed session makes against the service.

use async_trait::async_trait;

use emoji_core::{ArtifactId, EmojiArtifact, FeedPage, LikeReceipt};

use crate::client::EmojiClient;
use crate::error::ClientError;

/// Feed operations backing a [`crate::FeedSynchronizer`].
///
/// `like` and `unlike` must be idempotent per (user, artifact) pair.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    /// Load the feed as the session's viewer sees it.
    async fn load_feed(&self) -> Result<FeedPage, ClientError>;

    /// Ensure the viewer's like edge exists.
    async fn like(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError>;

    /// Ensure the viewer's like edge is gone.
    async fn unlike(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError>;

    /// Soft-delete an artifact.
    async fn soft_delete(&self, artifact_id: &ArtifactId) -> Result<EmojiArtifact, ClientError>;
}

#[async_trait]
impl FeedBackend for EmojiClient {
    async fn load_feed(&self) -> Result<FeedPage, ClientError> {
        self.feed().await
    }

    async fn like(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError> {
        EmojiClient::like(self, artifact_id).await
    }

    async fn unlike(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError> {
        EmojiClient::unlike(self, artifact_id).await
    }

    async fn soft_delete(&self, artifact_id: &ArtifactId) -> Result<EmojiArtifact, ClientError> {
        EmojiClient::soft_delete(self, artifact_id).await
    }
}
