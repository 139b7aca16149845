//! Replicate API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use emoji_core::JobId;

use super::types::{
    CreatePredictionRequest, PredictionInput, PredictionResponse, ReplicateErrorResponse,
};
use crate::provider::{InferenceProvider, Prediction, ProviderError};

/// Per-request timeout for API calls and downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Replicate API client.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    client: Client,
    base_url: String,
    api_token: String,
    model_version: String,
}

impl ReplicateClient {
    /// Create a new Replicate client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API URL (e.g., `"https://api.replicate.com/v1"`)
    /// * `api_token` - Replicate API token
    /// * `model_version` - Model version hash submitted with every prediction
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            model_version: model_version.into(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_token)
    }

    /// Handle API response, parsing success or error.
    async fn handle_response(response: reqwest::Response) -> Result<Prediction, ProviderError> {
        let status = response.status();

        if status.is_success() {
            let body: PredictionResponse = response.json().await?;
            return Ok(body.into());
        }

        let message = match response.json::<ReplicateErrorResponse>().await {
            Ok(err) => err
                .detail
                .or(err.title)
                .unwrap_or_else(|| format!("HTTP {status}")),
            Err(_) => format!("HTTP {status}"),
        };
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl InferenceProvider for ReplicateClient {
    async fn submit(&self, prompt: &str) -> Result<Prediction, ProviderError> {
        let url = format!("{}/predictions", self.base_url);
        let request = CreatePredictionRequest {
            version: self.model_version.clone(),
            input: PredictionInput {
                prompt: prompt.to_string(),
                apply_watermark: false,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let prediction = Self::handle_response(response).await?;
        tracing::debug!(job_id = %prediction.id, status = ?prediction.status, "Prediction created");
        Ok(prediction)
    }

    async fn get(&self, id: &JobId) -> Result<Prediction, ProviderError> {
        let url = format!("{}/predictions/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("download failed: HTTP {status}"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
