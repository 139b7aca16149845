//! Request and response types for the emoji client.

use serde::{Deserialize, Serialize};

use emoji_core::{EmojiArtifact, Tier};

/// Profile returned on sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    /// User ID.
    pub user_id: String,
    /// Verified email, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining credits.
    pub credits: i64,
    /// Account tier.
    pub tier: Tier,
    /// Whether the session carries the admin capability.
    pub is_admin: bool,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Account owner.
    pub user_id: String,
    /// Remaining credits.
    pub balance: i64,
}

/// Generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// What the emoji should show.
    pub prompt: String,
}

/// Successful generation.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Public image URL.
    pub url: String,
    /// The recorded feed entry.
    pub artifact: EmojiArtifact,
}

/// Admin credit grant.
#[derive(Debug, Clone, Serialize)]
pub struct AddCreditsRequest {
    /// Recipient.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Reason, recorded in the server log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Human-readable error.
    pub error: String,
    /// Machine-readable code.
    #[serde(default)]
    pub code: Option<String>,
    /// Longer explanation.
    #[serde(default)]
    pub message: Option<String>,
    /// Balance, on credit errors.
    #[serde(default)]
    pub balance: Option<i64>,
}

/// `POST /generate` answers 200 for both outcomes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum GenerateOutcome {
    Generated(GenerateResponse),
    Rejected(ApiErrorResponse),
}
