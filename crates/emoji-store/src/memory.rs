//! In-memory storage implementation.
//!
//! All tables live behind one mutex, so every compound operation is atomic. Change
//! events are published while the lock is held, which keeps the feed order identical
//! to the commit order.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;

use emoji_core::{
    sort_newest_first, ArtifactId, ChangeEvent, CreditAccount, EmojiArtifact, LikeEdge,
    LikeReceipt, NewArtifact, Operation, Reservation, ReservationId, Settlement, UserId,
};

use crate::error::{Result, StoreError};
use crate::events::ChangeFeed;
use crate::Store;

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, CreditAccount>,
    reservations: HashMap<ReservationId, Reservation>,
    artifacts: HashMap<ArtifactId, EmojiArtifact>,
    likes: HashMap<ArtifactId, HashMap<UserId, LikeEdge>>,
}

/// Store backed by in-process hash maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    feed: ChangeFeed,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose change feed buffers `capacity` events per subscriber.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            tables: Mutex::default(),
            feed: ChangeFeed::new(capacity),
        }
    }

    fn recount(tables: &mut Tables, artifact_id: &ArtifactId) -> Result<EmojiArtifact> {
        let count = tables.likes.get(artifact_id).map_or(0, HashMap::len);
        let artifact = tables
            .artifacts
            .get_mut(artifact_id)
            .ok_or_else(|| StoreError::not_found("artifact", artifact_id))?;
        artifact.likes_count = i64::try_from(count).unwrap_or(i64::MAX);
        Ok(artifact.clone())
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Credit Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>> {
        Ok(self.tables.lock().accounts.get(user_id).cloned())
    }

    fn get_or_create_account(&self, user_id: &UserId, starting_balance: i64) -> Result<CreditAccount> {
        let mut tables = self.tables.lock();
        let account = tables.accounts.entry(user_id.clone()).or_insert_with(|| {
            tracing::info!(user_id = %user_id, balance = starting_balance, "Credit account created");
            CreditAccount::new(user_id.clone(), starting_balance)
        });
        Ok(account.clone())
    }

    fn reserve_credits(&self, reservation: &Reservation) -> Result<i64> {
        let mut tables = self.tables.lock();
        let account = tables
            .accounts
            .get_mut(&reservation.user_id)
            .ok_or_else(|| StoreError::not_found("account", &reservation.user_id))?;

        if !account.has_sufficient_credits(reservation.amount) {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance,
                required: reservation.amount,
            });
        }

        account.balance -= reservation.amount;
        account.lifetime_reserved += reservation.amount;
        account.updated_at = Utc::now();
        let balance = account.balance;

        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(balance)
    }

    fn settle_reservation(&self, id: &ReservationId, outcome: Settlement) -> Result<bool> {
        let mut tables = self.tables.lock();
        let reservation = tables
            .reservations
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        if !reservation.settle(outcome) {
            return Ok(false);
        }

        if outcome == Settlement::Refund {
            let (user_id, amount) = (reservation.user_id.clone(), reservation.amount);
            let account = tables
                .accounts
                .get_mut(&user_id)
                .ok_or_else(|| StoreError::not_found("account", &user_id))?;
            account.balance += amount;
            account.lifetime_refunded += amount;
            account.updated_at = Utc::now();
        }
        Ok(true)
    }

    fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        Ok(self.tables.lock().reservations.get(id).cloned())
    }

    fn add_credits(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        let mut tables = self.tables.lock();
        let account = tables
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("account", user_id))?;
        account.balance += amount;
        account.updated_at = Utc::now();
        Ok(account.balance)
    }

    // =========================================================================
    // Artifact Operations
    // =========================================================================

    fn insert_artifact(&self, new: NewArtifact) -> Result<EmojiArtifact> {
        let mut tables = self.tables.lock();
        let mut artifact = EmojiArtifact::from_new(new);
        let observed_at = self.feed.stamp();
        artifact.created_at = observed_at;

        tables.artifacts.insert(artifact.id, artifact.clone());
        self.feed
            .publish(ChangeEvent::artifact(Operation::Insert, artifact.clone(), observed_at));
        Ok(artifact)
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<EmojiArtifact>> {
        Ok(self.tables.lock().artifacts.get(id).cloned())
    }

    fn list_artifacts(&self, include_deleted: bool) -> Result<Vec<EmojiArtifact>> {
        let mut artifacts: Vec<_> = self
            .tables
            .lock()
            .artifacts
            .values()
            .filter(|a| include_deleted || !a.deleted)
            .cloned()
            .collect();
        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    fn soft_delete_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact> {
        let mut tables = self.tables.lock();
        let artifact = tables
            .artifacts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("artifact", id))?;

        if artifact.deleted {
            return Ok(artifact.clone());
        }

        artifact.deleted = true;
        let artifact = artifact.clone();
        self.feed.publish(ChangeEvent::artifact(
            Operation::Update,
            artifact.clone(),
            self.feed.stamp(),
        ));
        Ok(artifact)
    }

    fn purge_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact> {
        let mut tables = self.tables.lock();
        let artifact = tables
            .artifacts
            .remove(id)
            .ok_or_else(|| StoreError::not_found("artifact", id))?;

        for edge in tables.likes.remove(id).unwrap_or_default().into_values() {
            self.feed
                .publish(ChangeEvent::like(Operation::Delete, edge, self.feed.stamp()));
        }
        self.feed.publish(ChangeEvent::artifact(
            Operation::Delete,
            artifact.clone(),
            self.feed.stamp(),
        ));
        Ok(artifact)
    }

    // =========================================================================
    // Like Operations
    // =========================================================================

    fn like(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<LikeReceipt> {
        let mut tables = self.tables.lock();
        match tables.artifacts.get(artifact_id) {
            Some(artifact) if !artifact.deleted => {}
            _ => return Err(StoreError::not_found("artifact", artifact_id)),
        }

        let edges = tables.likes.entry(*artifact_id).or_default();
        let inserted = if edges.contains_key(user_id) {
            None
        } else {
            let edge = LikeEdge::new(user_id.clone(), *artifact_id);
            edges.insert(user_id.clone(), edge.clone());
            Some(edge)
        };

        let artifact = Self::recount(&mut tables, artifact_id)?;
        if let Some(edge) = inserted {
            self.feed
                .publish(ChangeEvent::like(Operation::Insert, edge, self.feed.stamp()));
        }
        let observed_at = self.feed.stamp();
        self.feed.publish(ChangeEvent::artifact(
            Operation::Update,
            artifact.clone(),
            observed_at,
        ));

        Ok(LikeReceipt {
            artifact_id: *artifact_id,
            liked: true,
            likes_count: artifact.likes_count,
            observed_at,
        })
    }

    fn unlike(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<LikeReceipt> {
        let mut tables = self.tables.lock();
        if !tables.artifacts.contains_key(artifact_id) {
            return Err(StoreError::not_found("artifact", artifact_id));
        }

        let removed = tables
            .likes
            .get_mut(artifact_id)
            .and_then(|edges| edges.remove(user_id));

        let artifact = Self::recount(&mut tables, artifact_id)?;
        if let Some(edge) = removed {
            self.feed
                .publish(ChangeEvent::like(Operation::Delete, edge, self.feed.stamp()));
        }
        let observed_at = self.feed.stamp();
        self.feed.publish(ChangeEvent::artifact(
            Operation::Update,
            artifact.clone(),
            observed_at,
        ));

        Ok(LikeReceipt {
            artifact_id: *artifact_id,
            liked: false,
            likes_count: artifact.likes_count,
            observed_at,
        })
    }

    fn liked_artifact_ids(&self, user_id: &UserId) -> Result<HashSet<ArtifactId>> {
        Ok(self
            .tables
            .lock()
            .likes
            .iter()
            .filter(|(_, edges)| edges.contains_key(user_id))
            .map(|(id, _)| *id)
            .collect())
    }

    // =========================================================================
    // Change Feed
    // =========================================================================

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emoji_core::{ChangePayload, EntityType, ReservationState};
    use std::sync::Arc;

    fn new_artifact(store: &MemoryStore, prompt: &str) -> EmojiArtifact {
        store
            .insert_artifact(NewArtifact {
                image_url: format!("https://cdn.test/{prompt}.png"),
                prompt: prompt.to_string(),
                creator_id: UserId::generate(),
            })
            .unwrap()
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn account_is_created_once() {
        let store = MemoryStore::new();
        let user = UserId::generate();

        let first = store.get_or_create_account(&user, 3).unwrap();
        store.add_credits(&user, 2).unwrap();
        let second = store.get_or_create_account(&user, 3).unwrap();

        assert_eq!(first.balance, 3);
        assert_eq!(second.balance, 5);
    }

    #[test]
    fn reserve_is_conditional() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        store.get_or_create_account(&user, 1).unwrap();

        let first = Reservation::new(user.clone(), 1);
        assert_eq!(store.reserve_credits(&first).unwrap(), 0);

        let second = Reservation::new(user.clone(), 1);
        let err = store.reserve_credits(&second).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCredits {
                balance: 0,
                required: 1
            }
        ));
        assert!(store.get_reservation(&second.id).unwrap().is_none());
    }

    #[test]
    fn refund_settles_once() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        store.get_or_create_account(&user, 2).unwrap();

        let reservation = Reservation::new(user.clone(), 1);
        store.reserve_credits(&reservation).unwrap();

        assert!(store.settle_reservation(&reservation.id, Settlement::Refund).unwrap());
        assert!(!store.settle_reservation(&reservation.id, Settlement::Refund).unwrap());
        assert!(!store.settle_reservation(&reservation.id, Settlement::Consume).unwrap());

        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.balance, 2);
        assert_eq!(account.lifetime_refunded, 1);
        assert_eq!(
            store.get_reservation(&reservation.id).unwrap().unwrap().state,
            ReservationState::Refunded
        );
    }

    #[test]
    fn consume_keeps_the_debit() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        store.get_or_create_account(&user, 2).unwrap();

        let reservation = Reservation::new(user.clone(), 1);
        store.reserve_credits(&reservation).unwrap();
        assert!(store.settle_reservation(&reservation.id, Settlement::Consume).unwrap());
        assert!(!store.settle_reservation(&reservation.id, Settlement::Refund).unwrap());

        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.balance, 1);
        assert_eq!(account.lifetime_consumed(), 1);
    }

    #[test]
    fn insert_publishes_and_lists_newest_first() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        let first = new_artifact(&store, "first");
        let second = new_artifact(&store, "second");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.operation == Operation::Insert));

        let listed = store.list_artifacts(false).unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[0].likes_count, 0);
    }

    #[test]
    fn duplicate_like_creates_one_edge() {
        let store = MemoryStore::new();
        let artifact = new_artifact(&store, "a cat");
        let user = UserId::generate();
        let mut rx = store.subscribe();

        let first = store.like(&user, &artifact.id).unwrap();
        let second = store.like(&user, &artifact.id).unwrap();
        assert_eq!(first.likes_count, 1);
        assert_eq!(second.likes_count, 1);
        assert!(second.observed_at > first.observed_at);

        let like_inserts = drain(&mut rx)
            .into_iter()
            .filter(|e| e.entity_type() == EntityType::Like)
            .count();
        assert_eq!(like_inserts, 1);
        assert!(store.liked_artifact_ids(&user).unwrap().contains(&artifact.id));
    }

    #[test]
    fn like_count_tracks_edges_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let artifact = new_artifact(&store, "a cat");
        let users: Vec<_> = (0..16).map(|_| UserId::generate()).collect();

        let handles: Vec<_> = users
            .iter()
            .cloned()
            .map(|user| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.like(&user, &artifact.id).unwrap();
                    store.like(&user, &artifact.id).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_artifact(&artifact.id).unwrap().unwrap().likes_count, 16);

        store.unlike(&users[0], &artifact.id).unwrap();
        let receipt = store.unlike(&users[0], &artifact.id).unwrap();
        assert!(!receipt.liked);
        assert_eq!(receipt.likes_count, 15);
    }

    #[test]
    fn soft_delete_publishes_update_once() {
        let store = MemoryStore::new();
        let artifact = new_artifact(&store, "a cat");
        let mut rx = store.subscribe();

        assert!(store.soft_delete_artifact(&artifact.id).unwrap().deleted);
        assert!(store.soft_delete_artifact(&artifact.id).unwrap().deleted);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Update);
        assert!(store.list_artifacts(false).unwrap().is_empty());
        assert_eq!(store.list_artifacts(true).unwrap().len(), 1);
    }

    #[test]
    fn deleted_artifact_cannot_be_liked() {
        let store = MemoryStore::new();
        let artifact = new_artifact(&store, "a cat");
        store.soft_delete_artifact(&artifact.id).unwrap();

        let err = store.like(&UserId::generate(), &artifact.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn purge_removes_edges_and_publishes_deletes() {
        let store = MemoryStore::new();
        let artifact = new_artifact(&store, "a cat");
        let user = UserId::generate();
        store.like(&user, &artifact.id).unwrap();
        let mut rx = store.subscribe();

        store.purge_artifact(&artifact.id).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].payload, ChangePayload::Like(_)));
        assert_eq!(events[1].operation, Operation::Delete);
        assert!(store.get_artifact(&artifact.id).unwrap().is_none());
        assert!(store.liked_artifact_ids(&user).unwrap().is_empty());
    }
}
