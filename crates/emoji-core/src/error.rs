//! Domain error types.

use std::time::Duration;

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The account cannot cover the debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The backing store failed.
    #[error("ledger storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

/// Errors returned by a generation request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The prompt is empty or too long.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// The user has no credits left. Nothing was submitted.
    #[error("insufficient credits: balance={balance}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
    },

    /// The provider reported failure or could not be reached. The credit was refunded.
    #[error("provider failed: {0}")]
    ProviderFailed(String),

    /// The job did not finish before the deadline. The credit was refunded.
    #[error("provider timed out after {}s", .0.as_secs())]
    ProviderTimeout(Duration),

    /// No provider is configured.
    #[error("generation provider unavailable")]
    ProviderUnavailable,

    /// Persisting a successful generation failed. The credit stays consumed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The ledger failed while reserving.
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for GenerationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits { balance, .. } => Self::InsufficientCredits { balance },
            other => Self::Ledger(other),
        }
    }
}

impl GenerationError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrompt(_) => "invalid_prompt",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::ProviderFailed(_) => "provider_failed",
            Self::ProviderTimeout(_) => "provider_timeout",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Storage(_) => "storage_error",
            Self::Ledger(_) => "ledger_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_maps_across() {
        let err: GenerationError = LedgerError::InsufficientCredits {
            balance: 0,
            required: 1,
        }
        .into();
        assert_eq!(err, GenerationError::InsufficientCredits { balance: 0 });
        assert_eq!(err.code(), "insufficient_credits");
    }

    #[test]
    fn timeout_message_mentions_seconds() {
        let err = GenerationError::ProviderTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "provider timed out after 30s");
        assert_eq!(err.code(), "provider_timeout");
    }
}
