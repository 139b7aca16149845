//! Client error types.

use emoji_core::ArtifactId;

/// Errors that can occur when using the emoji client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Not enough credits to generate.
    #[error("insufficient credits: balance={balance}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
    },

    /// The server rejected the session token.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors returned by [`crate::FeedSynchronizer::toggle_like`].
#[derive(Debug, thiserror::Error)]
pub enum LikeError {
    /// The session has no signed-in user, or the user does not match the session.
    #[error("sign in to like emojis")]
    NotSignedIn,

    /// The artifact is not in the feed.
    #[error("unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),

    /// The backend rejected the like; the optimistic change was rolled back.
    #[error("like failed: {0}")]
    Backend(#[from] ClientError),

    /// The synchronizer has shut down.
    #[error("feed session closed")]
    Closed,
}

/// Errors returned by the other [`crate::FeedSynchronizer`] operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The viewer lacks the admin capability.
    #[error("forbidden")]
    Forbidden,

    /// The artifact is not in the feed.
    #[error("unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),

    /// A backend call failed.
    #[error("backend error: {0}")]
    Backend(#[from] ClientError),

    /// The synchronizer has shut down.
    #[error("feed session closed")]
    Closed,
}
