//! Replicate API types.

use serde::{Deserialize, Serialize};

use emoji_core::JobId;

use crate::provider::{Prediction, PredictionStatus};

/// Prediction creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePredictionRequest {
    /// Model version hash.
    pub version: String,
    /// Model input.
    pub input: PredictionInput,
}

/// Model input for the emoji model.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    /// Full prompt text.
    pub prompt: String,
    /// Whether the model stamps a watermark on its output.
    pub apply_watermark: bool,
}

/// Prediction output: models return either a list of URLs or a single URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    /// Several output files.
    Many(Vec<String>),
    /// One output file.
    One(String),
}

/// Prediction as returned by `POST /predictions` and `GET /predictions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    /// Prediction ID.
    pub id: String,
    /// Current status.
    pub status: PredictionStatus,
    /// Output, present once succeeded.
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    /// Error detail, present once failed.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl From<PredictionResponse> for Prediction {
    fn from(response: PredictionResponse) -> Self {
        let output = match response.output {
            Some(PredictionOutput::Many(urls)) => urls,
            Some(PredictionOutput::One(url)) => vec![url],
            None => Vec::new(),
        };
        let error = response.error.and_then(|e| match e {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        Self {
            id: JobId::new(response.id),
            status: response.status,
            output,
            error,
        }
    }
}

/// Replicate error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateErrorResponse {
    /// Human-readable detail.
    #[serde(default)]
    pub detail: Option<String>,
    /// Short title.
    #[serde(default)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_url_output_is_normalized() {
        let response: PredictionResponse = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.png"
        }))
        .unwrap();
        let prediction = Prediction::from(response);
        assert_eq!(prediction.output, vec!["https://replicate.delivery/out.png"]);
    }

    #[test]
    fn pending_prediction_has_no_output() {
        let response: PredictionResponse = serde_json::from_value(serde_json::json!({
            "id": "p2",
            "status": "starting",
            "output": null,
            "error": null
        }))
        .unwrap();
        let prediction = Prediction::from(response);
        assert_eq!(prediction.status, PredictionStatus::Starting);
        assert!(prediction.output.is_empty());
        assert!(prediction.error.is_none());
    }
}
