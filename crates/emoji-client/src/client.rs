//! Emoji HTTP client implementation.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use emoji_core::{ArtifactId, EmojiArtifact, FeedPage, LikeReceipt};

use crate::error::ClientError;
use crate::types::{
    AddCreditsRequest, ApiErrorResponse, BalanceResponse, GenerateOutcome, GenerateRequest,
    GenerateResponse, ProfileResponse,
};

/// Emoji API client.
///
/// Without an access token the client can only read the feed.
#[derive(Debug, Clone)]
pub struct EmojiClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl EmojiClient {
    /// Create a new anonymous client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the emoji service (e.g., `"http://localhost:8080"`)
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: options.access_token,
        })
    }

    /// Use `token` as the bearer token for every request.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Whether requests carry a session token.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Fetch the caller's profile, creating the credit account on first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn ensure_profile(&self) -> Result<ProfileResponse, ClientError> {
        let response = self.request(reqwest::Method::POST, "/v1/profile").send().await?;
        Self::handle_response(response).await
    }

    /// Get the caller's credit balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self) -> Result<BalanceResponse, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/credits/balance")
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Generate an emoji, spending one credit on success.
    ///
    /// # Errors
    ///
    /// - `ClientError::InsufficientCredits` when the balance is zero.
    /// - `ClientError::Api` with code `provider_failed`, `provider_timeout`,
    ///   `storage_error` or `invalid_prompt` for failed generations.
    pub async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/generate")
            .json(&GenerateRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?;

        match Self::handle_response::<GenerateOutcome>(response).await? {
            GenerateOutcome::Generated(generated) => Ok(generated),
            GenerateOutcome::Rejected(ApiErrorResponse {
                balance: Some(balance),
                ..
            }) => Err(ClientError::InsufficientCredits { balance }),
            GenerateOutcome::Rejected(rejected) => Err(ClientError::Api {
                code: rejected.code.unwrap_or_else(|| "unknown".to_string()),
                message: rejected.error,
                status: StatusCode::OK.as_u16(),
            }),
        }
    }

    /// Load the feed, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn feed(&self) -> Result<FeedPage, ClientError> {
        let response = self.request(reqwest::Method::GET, "/v1/feed").send().await?;
        Self::handle_response(response).await
    }

    /// Like an artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn like(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/v1/feed/{artifact_id}/like"))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Remove a like.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn unlike(&self, artifact_id: &ArtifactId) -> Result<LikeReceipt, ClientError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/feed/{artifact_id}/like"))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Soft-delete an artifact (admin only).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn soft_delete(&self, artifact_id: &ArtifactId) -> Result<EmojiArtifact, ClientError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/feed/{artifact_id}"))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Permanently remove an artifact and its likes (admin only).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn purge(&self, artifact_id: &ArtifactId) -> Result<EmojiArtifact, ClientError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/v1/feed/{artifact_id}/purge"),
            )
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Grant credits to a user (admin only).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn add_credits(
        &self,
        request: &AddCreditsRequest,
    ) -> Result<BalanceResponse, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/credits/add")
            .json(request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        match response.json::<ApiErrorResponse>().await {
            Ok(body) if status == StatusCode::NOT_FOUND => Err(ClientError::NotFound(body.error)),
            Ok(body) => Err(ClientError::Api {
                code: body.code.unwrap_or_else(|| "unknown".to_string()),
                message: body.error,
                status: status.as_u16(),
            }),
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 60, generation can take half a minute).
    pub timeout_seconds: u64,
    /// Bearer token for signed-in requests.
    pub access_token: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            access_token: None,
        }
    }
}
