//! Credit balance handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use emoji_core::UserId;

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account owner.
    pub user_id: String,
    /// Remaining credits.
    pub balance: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(auth.user_id())?;
    Ok(Json(BalanceResponse {
        user_id: auth.user_id().to_string(),
        balance,
    }))
}

/// Admin credit grant request.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// Recipient.
    pub user_id: String,
    /// Credits to add (must be positive).
    pub amount: i64,
    /// Reason, recorded in the log.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Add credits to a user's balance (admin only).
pub async fn admin_add_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Json(body): Json<AddCreditsRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if body.amount <= 0 {
        return Err(ApiError::BadRequest("Amount must be positive".into()));
    }
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id: {}", body.user_id)))?;

    let balance = state.ledger.grant(&user_id, body.amount)?;

    tracing::info!(
        admin_id = %admin.identity.user_id,
        user_id = %user_id,
        amount = body.amount,
        reason = body.reason.as_deref().unwrap_or("-"),
        "Admin granted credits"
    );

    Ok(Json(BalanceResponse {
        user_id: user_id.to_string(),
        balance,
    }))
}
