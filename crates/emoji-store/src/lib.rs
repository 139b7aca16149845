//! Storage layer for the emoji service.
//!
//! This crate provides persistence for credit accounts, reservations, artifact rows
//! and like edges, plus blob storage for generated images and the change feed that
//! every write publishes to.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process maps, used by default and in tests.
//! - `RocksStore`: `RocksDB` with column families (feature `rocksdb-backend`).
//! - [`LocalBlobStore`] / [`MemoryBlobStore`]: blob storage.
//!
//! # Example
//!
//! ```
//! use emoji_store::{MemoryStore, Store};
//! use emoji_core::{NewArtifact, UserId};
//!
//! let store = MemoryStore::new();
//! let mut events = store.subscribe();
//!
//! let artifact = store
//!     .insert_artifact(NewArtifact {
//!         image_url: "https://cdn.example/cat.png".into(),
//!         prompt: "a cat".into(),
//!         creator_id: UserId::generate(),
//!     })
//!     .unwrap();
//!
//! assert_eq!(events.try_recv().unwrap().artifact_id(), artifact.id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod blob;
pub mod error;
pub mod events;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore, ObjectPath, PublicUrl};
pub use error::{Result, StoreError};
pub use events::ChangeFeed;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use std::collections::HashSet;

use tokio::sync::broadcast;

use emoji_core::{
    ArtifactId, ChangeEvent, CreditAccount, EmojiArtifact, LikeReceipt, NewArtifact,
    Reservation, ReservationId, Settlement, UserId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing). Every mutation of an artifact row or a
/// like edge publishes a [`ChangeEvent`] to the store's feed after it commits.
pub trait Store: Send + Sync {
    // =========================================================================
    // Credit Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>>;

    /// Get the account for a user, creating it with `starting_balance` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_account(&self, user_id: &UserId, starting_balance: i64) -> Result<CreditAccount>;

    /// Debit `reservation.amount` and record the reservation, atomically.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance cannot cover the amount;
    ///   nothing is written in that case.
    fn reserve_credits(&self, reservation: &Reservation) -> Result<i64>;

    /// Settle an open reservation, returning the credits to the account on refund.
    ///
    /// Returns `Ok(false)` without writing anything if the reservation was already
    /// settled.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the reservation or its account doesn't exist.
    fn settle_reservation(&self, id: &ReservationId, outcome: Settlement) -> Result<bool>;

    /// Get a reservation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>>;

    /// Add credits to an account. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn add_credits(&self, user_id: &UserId, amount: i64) -> Result<i64>;

    // =========================================================================
    // Artifact Operations
    // =========================================================================

    /// Insert a new artifact row (`likes_count = 0`, not deleted).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_artifact(&self, new: NewArtifact) -> Result<EmojiArtifact>;

    /// Get an artifact by ID, deleted or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<EmojiArtifact>>;

    /// List artifacts newest first, optionally including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_artifacts(&self, include_deleted: bool) -> Result<Vec<EmojiArtifact>>;

    /// Set the soft-delete flag. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the artifact doesn't exist.
    fn soft_delete_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact>;

    /// Remove an artifact row and all of its like edges.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the artifact doesn't exist.
    fn purge_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact>;

    // =========================================================================
    // Like Operations
    // =========================================================================

    /// Create the (user, artifact) edge if absent and recompute the like count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the artifact doesn't exist or is deleted.
    fn like(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<LikeReceipt>;

    /// Remove the (user, artifact) edge if present and recompute the like count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the artifact doesn't exist.
    fn unlike(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<LikeReceipt>;

    /// IDs of all artifacts the user has liked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn liked_artifact_ids(&self, user_id: &UserId) -> Result<HashSet<ArtifactId>>;

    // =========================================================================
    // Change Feed
    // =========================================================================

    /// The change feed this store publishes to.
    fn changes(&self) -> &ChangeFeed;

    /// Subscribe to change events published from now on.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes().subscribe()
    }
}
