//! Credit reservations.
//!
//! A reservation is a provisional debit tied to one generation attempt. It is
//! created in the `Reserved` state and settles exactly once, either as `Consumed`
//! (the generation succeeded) or `Refunded` (the credit went back to the account).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReservationId, UserId};

/// A provisional credit debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID (ULID for time-ordering).
    pub id: ReservationId,

    /// The user whose balance was debited.
    pub user_id: UserId,

    /// Credits held by this reservation.
    pub amount: i64,

    /// Settlement state.
    pub state: ReservationState,

    /// When the credits were reserved.
    pub created_at: DateTime<Utc>,

    /// When the reservation was consumed or refunded.
    pub settled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Create a new, unsettled reservation.
    #[must_use]
    pub fn new(user_id: UserId, amount: i64) -> Self {
        Self {
            id: ReservationId::generate(),
            user_id,
            amount,
            state: ReservationState::Reserved,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Whether the reservation is still awaiting settlement.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ReservationState::Reserved
    }

    /// Settle the reservation.
    ///
    /// Returns `false` and leaves the reservation untouched if it was already settled.
    pub fn settle(&mut self, outcome: Settlement) -> bool {
        if !self.is_open() {
            return false;
        }
        self.state = match outcome {
            Settlement::Consume => ReservationState::Consumed,
            Settlement::Refund => ReservationState::Refunded,
        };
        self.settled_at = Some(Utc::now());
        true
    }
}

/// State of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Credits are held.
    Reserved,
    /// Credits were spent on a successful generation.
    Consumed,
    /// Credits were returned to the account.
    Refunded,
}

/// How to settle an open reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Keep the debit.
    Consume,
    /// Return the credits.
    Refund,
}
