//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use emoji_core::{GenerationError, LedgerError};
use emoji_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A generation request failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<i64>,
}

impl ErrorBody {
    fn new(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            error: error.into(),
            code: Some(code),
            message: None,
            balance: None,
        }
    }
}

fn generation_response(err: &GenerationError) -> (StatusCode, ErrorBody) {
    match err {
        // Soft error: 200 with an error body.
        GenerationError::InsufficientCredits { balance } => (
            StatusCode::OK,
            ErrorBody {
                error: "Insufficient credits".into(),
                code: None,
                message: Some("You need at least 1 credit to generate an emoji.".into()),
                balance: Some(*balance),
            },
        ),
        GenerationError::InvalidPrompt(msg) => {
            (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone(), err.code()))
        }
        GenerationError::ProviderFailed(_) | GenerationError::ProviderTimeout(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Failed to generate emoji", err.code()),
        ),
        GenerationError::ProviderUnavailable => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Emoji generation is not configured", err.code()),
        ),
        GenerationError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Failed to save emoji", err.code()),
        ),
        GenerationError::Ledger(e) => {
            tracing::error!(error = %e, "Ledger failure during generation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("An internal error occurred", "internal_error"),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new("Unauthorized", "unauthorized"),
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, ErrorBody::new("Forbidden", "forbidden")),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new(msg.clone(), "not_found")),
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(msg.clone(), "bad_request"),
            ),
            Self::Generation(err) => generation_response(err),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An internal error occurred", "internal_error"),
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody::new(msg.clone(), "external_service_error"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientCredits { balance, .. } => {
                Self::Generation(GenerationError::InsufficientCredits { balance })
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits { balance, .. } => {
                Self::Generation(GenerationError::InsufficientCredits { balance })
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn insufficient_credits_is_a_soft_error() {
        let (status, body) =
            body_of(GenerationError::InsufficientCredits { balance: 0 }.into()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Insufficient credits");
        assert_eq!(body["balance"], 0);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn provider_timeout_carries_code() {
        let (status, body) =
            body_of(GenerationError::ProviderTimeout(Duration::from_secs(30)).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "provider_timeout");
    }

    #[tokio::test]
    async fn store_not_found_maps_to_404() {
        let err: ApiError = StoreError::NotFound {
            entity: "artifact",
            id: "x".into(),
        }
        .into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }
}
