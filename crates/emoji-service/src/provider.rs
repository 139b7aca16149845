//! Inference provider boundary.
//!
//! The orchestrator only needs three calls from a provider: submit a prompt, read a
//! job's status, and fetch an output file. [`crate::replicate::ReplicateClient`] is
//! the production implementation; tests script their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use emoji_core::JobId;

/// Provider-reported job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    /// Queued, not yet running.
    Starting,
    /// Running.
    Processing,
    /// Finished with output.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled before finishing.
    Canceled,
}

impl PredictionStatus {
    /// Whether the provider will not change this status again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Snapshot of a provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Provider job ID.
    pub id: JobId,
    /// Current status.
    pub status: PredictionStatus,
    /// Output URLs, first one is the image.
    pub output: Vec<String>,
    /// Provider error message, if any.
    pub error: Option<String>,
}

/// Errors talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether a single retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Asynchronous image generation service.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Submit a prompt and return the created job.
    async fn submit(&self, prompt: &str) -> Result<Prediction, ProviderError>;

    /// Read the current state of a job.
    async fn get(&self, id: &JobId) -> Result<Prediction, ProviderError>;

    /// Download an output file.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_provider_strings() {
        let status: PredictionStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, PredictionStatus::Canceled);
        assert!(status.is_terminal());
        assert!(!PredictionStatus::Processing.is_terminal());
    }

    #[test]
    fn only_transport_and_server_errors_are_transient() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 422,
            message: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Decode("eof".into()).is_transient());
    }
}
