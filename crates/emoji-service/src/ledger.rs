//! Credit ledger.
//!
//! Each user has one integer balance. A generation reserves one credit up front, and
//! the reservation is later consumed or refunded exactly once. Operations on the same
//! user run inside a per-user critical section; different users never contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use emoji_core::{
    CreditAccount, LedgerError, Reservation, ReservationId, Result, Settlement, UserId,
    GENERATION_COST,
};
use emoji_store::{Store, StoreError};

/// Proof of a successful reservation, handed back to `consume` or `refund`.
#[derive(Debug, PartialEq, Eq)]
pub struct ReservationToken {
    /// Reservation record ID.
    pub id: ReservationId,
    /// Owner of the reserved credit.
    pub user_id: UserId,
    /// Reserved amount.
    pub amount: i64,
    /// Balance right after the reservation.
    pub balance_after: i64,
}

fn ledger_err(err: StoreError) -> LedgerError {
    match err {
        StoreError::InsufficientCredits { balance, required } => {
            LedgerError::InsufficientCredits { balance, required }
        }
        other => LedgerError::Storage(other.to_string()),
    }
}

/// Per-user credit balances on top of a [`Store`].
pub struct CreditLedger {
    store: Arc<dyn Store>,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
    starting_credits: i64,
}

impl CreditLedger {
    /// Create a ledger granting `starting_credits` to new accounts.
    pub fn new(store: Arc<dyn Store>, starting_credits: i64) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            starting_credits,
        }
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Get the user's account, creating it with the starting balance if absent.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store fails.
    pub fn ensure_account(&self, user_id: &UserId) -> Result<CreditAccount> {
        self.store
            .get_or_create_account(user_id, self.starting_credits)
            .map_err(ledger_err)
    }

    /// Current balance, creating the account if needed.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store fails.
    pub fn balance(&self, user_id: &UserId) -> Result<i64> {
        Ok(self.ensure_account(user_id)?.balance)
    }

    /// Reserve one generation's worth of credits.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InsufficientCredits` if the balance is below the cost. Nothing
    ///   changes in that case.
    /// - `LedgerError::Storage` if the store fails.
    pub fn reserve(&self, user_id: &UserId) -> Result<ReservationToken> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        self.ensure_account(user_id)?;
        let reservation = Reservation::new(user_id.clone(), GENERATION_COST);
        let balance_after = self
            .store
            .reserve_credits(&reservation)
            .map_err(ledger_err)?;

        tracing::info!(
            user_id = %user_id,
            reservation_id = %reservation.id,
            balance = balance_after,
            "Credit reserved"
        );

        Ok(ReservationToken {
            id: reservation.id,
            user_id: reservation.user_id,
            amount: reservation.amount,
            balance_after,
        })
    }

    /// Return a reserved credit. Returns `false` if the token was already settled.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store fails.
    pub fn refund(&self, token: &ReservationToken) -> Result<bool> {
        self.settle(token, Settlement::Refund)
    }

    /// Mark a reserved credit as spent. Returns `false` if the token was already settled.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store fails.
    pub fn consume(&self, token: &ReservationToken) -> Result<bool> {
        self.settle(token, Settlement::Consume)
    }

    fn settle(&self, token: &ReservationToken, outcome: Settlement) -> Result<bool> {
        let lock = self.user_lock(&token.user_id);
        let _guard = lock.lock();

        let settled = self
            .store
            .settle_reservation(&token.id, outcome)
            .map_err(ledger_err)?;

        if settled {
            tracing::info!(
                user_id = %token.user_id,
                reservation_id = %token.id,
                outcome = ?outcome,
                "Reservation settled"
            );
        } else {
            tracing::warn!(
                user_id = %token.user_id,
                reservation_id = %token.id,
                outcome = ?outcome,
                "Reservation already settled"
            );
        }
        Ok(settled)
    }

    /// Add credits to a user's balance. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store fails.
    pub fn grant(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        self.ensure_account(user_id)?;
        let balance = self.store.add_credits(user_id, amount).map_err(ledger_err)?;
        tracing::info!(user_id = %user_id, amount, balance, "Credits granted");
        Ok(balance)
    }
}
