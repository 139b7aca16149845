//! Credit account types.
//!
//! Every user owns exactly one credit account. Accounts are created lazily the first
//! time the ledger sees a user and start with [`DEFAULT_STARTING_CREDITS`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Credits granted to a freshly created account.
pub const DEFAULT_STARTING_CREDITS: i64 = 3;

/// Credits consumed by one successful generation.
pub const GENERATION_COST: i64 = 1;

/// A user's credit account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    /// The owning user (from the identity provider).
    pub user_id: UserId,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Account tier.
    pub tier: Tier,

    /// Credits ever moved into reservations.
    pub lifetime_reserved: i64,

    /// Credits ever returned by refunds.
    pub lifetime_refunded: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create a new free-tier account with the given starting balance.
    #[must_use]
    pub fn new(user_id: UserId, starting_balance: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: starting_balance.max(0),
            tier: Tier::Free,
            lifetime_reserved: 0,
            lifetime_refunded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of `amount`.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Credits actually spent on successful generations.
    #[must_use]
    pub fn lifetime_consumed(&self) -> i64 {
        self.lifetime_reserved - self.lifetime_refunded
    }
}

/// Account tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Default tier for new accounts.
    Free,

    /// Paying tier.
    Pro,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_gets_starting_balance() {
        let account = CreditAccount::new(UserId::generate(), DEFAULT_STARTING_CREDITS);
        assert_eq!(account.balance, 3);
        assert_eq!(account.tier, Tier::Free);
        assert_eq!(account.lifetime_consumed(), 0);
    }

    #[test]
    fn negative_starting_balance_is_clamped() {
        let account = CreditAccount::new(UserId::generate(), -5);
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn account_sufficient_credits() {
        let mut account = CreditAccount::new(UserId::generate(), 0);
        assert!(!account.has_sufficient_credits(GENERATION_COST));

        account.balance = 1;
        assert!(account.has_sufficient_credits(GENERATION_COST));
        assert!(!account.has_sufficient_credits(2));
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Free).unwrap(), "\"free\"");
    }
}
