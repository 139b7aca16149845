//! Profile handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use emoji_core::{CreditAccount, Tier};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Profile response.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    /// User ID.
    pub user_id: String,
    /// Verified email, if known.
    pub email: Option<String>,
    /// Remaining credits.
    pub credits: i64,
    /// Account tier.
    pub tier: Tier,
    /// Whether the session carries the admin capability.
    pub is_admin: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl ProfileResponse {
    fn new(account: &CreditAccount, auth: &AuthUser) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            email: auth.identity.email.clone(),
            credits: account.balance,
            tier: account.tier,
            is_admin: auth.identity.is_admin(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Get the caller's profile, creating the credit account on first sign-in.
pub async fn ensure_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let account = state.ledger.ensure_account(auth.user_id())?;
    Ok(Json(ProfileResponse::new(&account, &auth)))
}
