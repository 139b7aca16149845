//! `RocksDB` storage implementation.
//!
//! Values are CBOR-encoded. Compound operations read, check and write under a single
//! writer lock and commit through one `WriteBatch`, so a crash never leaves a like
//! edge without its index entry or a debit without its reservation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use emoji_core::{
    sort_newest_first, ArtifactId, ChangeEvent, CreditAccount, EmojiArtifact, LikeEdge,
    LikeReceipt, NewArtifact, Operation, Reservation, ReservationId, Settlement, UserId,
};

use crate::error::{Result, StoreError};
use crate::events::ChangeFeed;
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
    feed: ChangeFeed,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_feed(path, ChangeFeed::default())
    }

    /// Open a database that publishes to the given change feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_feed<P: AsRef<Path>>(path: P, feed: ChangeFeed) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors).map_err(db_err)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            feed,
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key, Self::serialize(value)?)
            .map_err(db_err)
    }

    /// Keys under `prefix` in the given column family.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(key);
        }
        Ok(out)
    }

    fn count_likes(&self, artifact_id: &ArtifactId) -> Result<i64> {
        let count = self
            .prefix_keys(cf::LIKES_BY_ARTIFACT, &keys::artifact_key(artifact_id))?
            .len();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    fn require_account(&self, user_id: &UserId) -> Result<CreditAccount> {
        self.get_account(user_id)?
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    fn require_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact> {
        self.get_artifact(id)?
            .ok_or_else(|| StoreError::not_found("artifact", id))
    }

    /// Toggle one like edge and persist the recomputed count in the same batch.
    fn set_like(&self, user_id: &UserId, artifact_id: &ArtifactId, liked: bool) -> Result<LikeReceipt> {
        let _guard = self.write_lock.lock();

        let mut artifact = self.require_artifact(artifact_id)?;
        if liked && artifact.deleted {
            return Err(StoreError::not_found("artifact", artifact_id));
        }

        let like_key = keys::like_key(user_id, artifact_id);
        let index_key = keys::artifact_like_key(artifact_id, user_id);
        let existing: Option<LikeEdge> = self.get_value(cf::LIKES, &like_key)?;

        let cf_likes = self.cf(cf::LIKES)?;
        let cf_index = self.cf(cf::LIKES_BY_ARTIFACT)?;
        let cf_artifacts = self.cf(cf::ARTIFACTS)?;

        let mut batch = WriteBatch::default();
        let changed = match (liked, existing) {
            (true, None) => {
                let edge = LikeEdge::new(user_id.clone(), *artifact_id);
                batch.put_cf(&cf_likes, &like_key, Self::serialize(&edge)?);
                batch.put_cf(&cf_index, &index_key, []);
                artifact.likes_count = self.count_likes(artifact_id)? + 1;
                Some((Operation::Insert, edge))
            }
            (false, Some(edge)) => {
                batch.delete_cf(&cf_likes, &like_key);
                batch.delete_cf(&cf_index, &index_key);
                artifact.likes_count = (self.count_likes(artifact_id)? - 1).max(0);
                Some((Operation::Delete, edge))
            }
            _ => {
                artifact.likes_count = self.count_likes(artifact_id)?;
                None
            }
        };
        batch.put_cf(
            &cf_artifacts,
            keys::artifact_key(artifact_id),
            Self::serialize(&artifact)?,
        );
        self.db.write(batch).map_err(db_err)?;

        if let Some((operation, edge)) = changed {
            self.feed
                .publish(ChangeEvent::like(operation, edge, self.feed.stamp()));
        }
        let observed_at = self.feed.stamp();
        self.feed.publish(ChangeEvent::artifact(
            Operation::Update,
            artifact.clone(),
            observed_at,
        ));

        Ok(LikeReceipt {
            artifact_id: *artifact_id,
            liked,
            likes_count: artifact.likes_count,
            observed_at,
        })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Credit Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn get_or_create_account(&self, user_id: &UserId, starting_balance: i64) -> Result<CreditAccount> {
        let _guard = self.write_lock.lock();
        if let Some(account) = self.get_account(user_id)? {
            return Ok(account);
        }

        let account = CreditAccount::new(user_id.clone(), starting_balance);
        self.put_value(cf::ACCOUNTS, &keys::account_key(user_id), &account)?;
        tracing::info!(user_id = %user_id, balance = account.balance, "Credit account created");
        Ok(account)
    }

    fn reserve_credits(&self, reservation: &Reservation) -> Result<i64> {
        let _guard = self.write_lock.lock();
        let mut account = self.require_account(&reservation.user_id)?;

        if !account.has_sufficient_credits(reservation.amount) {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance,
                required: reservation.amount,
            });
        }

        account.balance -= reservation.amount;
        account.lifetime_reserved += reservation.amount;
        account.updated_at = Utc::now();

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_reservations = self.cf(cf::RESERVATIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&reservation.user_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_reservations,
            keys::reservation_key(&reservation.id),
            Self::serialize(reservation)?,
        );
        self.db.write(batch).map_err(db_err)?;

        Ok(account.balance)
    }

    fn settle_reservation(&self, id: &ReservationId, outcome: Settlement) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut reservation = self
            .get_reservation(id)?
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        if !reservation.settle(outcome) {
            return Ok(false);
        }

        let cf_reservations = self.cf(cf::RESERVATIONS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_reservations,
            keys::reservation_key(id),
            Self::serialize(&reservation)?,
        );

        if outcome == Settlement::Refund {
            let mut account = self.require_account(&reservation.user_id)?;
            account.balance += reservation.amount;
            account.lifetime_refunded += reservation.amount;
            account.updated_at = Utc::now();

            let cf_accounts = self.cf(cf::ACCOUNTS)?;
            batch.put_cf(
                &cf_accounts,
                keys::account_key(&reservation.user_id),
                Self::serialize(&account)?,
            );
        }

        self.db.write(batch).map_err(db_err)?;
        Ok(true)
    }

    fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        self.get_value(cf::RESERVATIONS, &keys::reservation_key(id))
    }

    fn add_credits(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        let _guard = self.write_lock.lock();
        let mut account = self.require_account(user_id)?;
        account.balance += amount;
        account.updated_at = Utc::now();
        self.put_value(cf::ACCOUNTS, &keys::account_key(user_id), &account)?;
        Ok(account.balance)
    }

    // =========================================================================
    // Artifact Operations
    // =========================================================================

    fn insert_artifact(&self, new: NewArtifact) -> Result<EmojiArtifact> {
        let _guard = self.write_lock.lock();
        let mut artifact = EmojiArtifact::from_new(new);
        let observed_at = self.feed.stamp();
        artifact.created_at = observed_at;

        self.put_value(cf::ARTIFACTS, &keys::artifact_key(&artifact.id), &artifact)?;
        self.feed
            .publish(ChangeEvent::artifact(Operation::Insert, artifact.clone(), observed_at));
        Ok(artifact)
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<EmojiArtifact>> {
        self.get_value(cf::ARTIFACTS, &keys::artifact_key(id))
    }

    fn list_artifacts(&self, include_deleted: bool) -> Result<Vec<EmojiArtifact>> {
        let cf = self.cf(cf::ARTIFACTS)?;
        let mut artifacts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(db_err)?;
            let artifact: EmojiArtifact = Self::deserialize(&value)?;
            if include_deleted || !artifact.deleted {
                artifacts.push(artifact);
            }
        }
        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    fn soft_delete_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact> {
        let _guard = self.write_lock.lock();
        let mut artifact = self.require_artifact(id)?;
        if artifact.deleted {
            return Ok(artifact);
        }

        artifact.deleted = true;
        self.put_value(cf::ARTIFACTS, &keys::artifact_key(id), &artifact)?;
        self.feed.publish(ChangeEvent::artifact(
            Operation::Update,
            artifact.clone(),
            self.feed.stamp(),
        ));
        Ok(artifact)
    }

    fn purge_artifact(&self, id: &ArtifactId) -> Result<EmojiArtifact> {
        let _guard = self.write_lock.lock();
        let artifact = self.require_artifact(id)?;

        let cf_artifacts = self.cf(cf::ARTIFACTS)?;
        let cf_likes = self.cf(cf::LIKES)?;
        let cf_index = self.cf(cf::LIKES_BY_ARTIFACT)?;

        let artifact_key = keys::artifact_key(id);
        let mut edges = Vec::new();
        let mut batch = WriteBatch::default();
        for index_key in self.prefix_keys(cf::LIKES_BY_ARTIFACT, &artifact_key)? {
            let user = std::str::from_utf8(&index_key[artifact_key.len()..])
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let user_id = UserId::new(user).map_err(|e| StoreError::Serialization(e.to_string()))?;
            let like_key = keys::like_key(&user_id, id);
            if let Some(edge) = self.get_value::<LikeEdge>(cf::LIKES, &like_key)? {
                edges.push(edge);
            }
            batch.delete_cf(&cf_likes, &like_key);
            batch.delete_cf(&cf_index, &index_key);
        }
        batch.delete_cf(&cf_artifacts, &artifact_key);
        self.db.write(batch).map_err(db_err)?;

        for edge in edges {
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
        self.set_like(user_id, artifact_id, true)
    }

    fn unlike(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<LikeReceipt> {
        self.set_like(user_id, artifact_id, false)
    }

    fn liked_artifact_ids(&self, user_id: &UserId) -> Result<HashSet<ArtifactId>> {
        Ok(self
            .prefix_keys(cf::LIKES, &keys::user_likes_prefix(user_id))?
            .iter()
            .filter_map(|key| keys::artifact_id_from_like_key(key))
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
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn new_artifact(store: &RocksStore) -> EmojiArtifact {
        store
            .insert_artifact(NewArtifact {
                image_url: "https://cdn.test/cat.png".into(),
                prompt: "a cat".into(),
                creator_id: UserId::generate(),
            })
            .unwrap()
    }

    #[test]
    fn reserve_and_refund() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.get_or_create_account(&user_id, 1).unwrap();

        let reservation = Reservation::new(user_id.clone(), 1);
        assert_eq!(store.reserve_credits(&reservation).unwrap(), 0);

        let second = Reservation::new(user_id.clone(), 1);
        assert!(matches!(
            store.reserve_credits(&second),
            Err(StoreError::InsufficientCredits { balance: 0, .. })
        ));

        assert!(store.settle_reservation(&reservation.id, Settlement::Refund).unwrap());
        assert!(!store.settle_reservation(&reservation.id, Settlement::Refund).unwrap());
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().balance, 1);
    }

    #[test]
    fn likes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        let artifact_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            let artifact = new_artifact(&store);
            store.like(&user_id, &artifact.id).unwrap();
            store.like(&user_id, &artifact.id).unwrap();
            artifact.id
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let artifact = store.get_artifact(&artifact_id).unwrap().unwrap();
        assert_eq!(artifact.likes_count, 1);
        assert!(store.liked_artifact_ids(&user_id).unwrap().contains(&artifact_id));

        let receipt = store.unlike(&user_id, &artifact_id).unwrap();
        assert_eq!(receipt.likes_count, 0);
        assert!(store.liked_artifact_ids(&user_id).unwrap().is_empty());
    }

    #[test]
    fn list_hides_deleted_rows() {
        let (store, _dir) = create_test_store();
        let keep = new_artifact(&store);
        let gone = new_artifact(&store);
        store.soft_delete_artifact(&gone.id).unwrap();

        let visible = store.list_artifacts(false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, keep.id);
        assert_eq!(store.list_artifacts(true).unwrap()[0].id, gone.id);
    }

    #[test]
    fn purge_drops_edges() {
        let (store, _dir) = create_test_store();
        let artifact = new_artifact(&store);
        let user_id = UserId::generate();
        store.like(&user_id, &artifact.id).unwrap();
        let mut rx = store.subscribe();

        store.purge_artifact(&artifact.id).unwrap();

        assert!(store.get_artifact(&artifact.id).unwrap().is_none());
        assert!(store.liked_artifact_ids(&user_id).unwrap().is_empty());
        assert_eq!(rx.try_recv().unwrap().operation, Operation::Delete);
        assert_eq!(rx.try_recv().unwrap().operation, Operation::Delete);
    }
}
