//! Per-session feed state and the reducer every mutation goes through.
//!
//! Artifact rows are last-write-wins registers keyed by id and ordered by the store's
//! `observed_at`. Deletes leave a tombstone so a late insert or update cannot bring a
//! row back. The viewer's like flag is a second register per artifact, fed by like
//! edge events and receipts. Optimistic likes sit on top of both and only change
//! what is displayed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use emoji_core::{
    ArtifactId, ChangeEvent, ChangePayload, EmojiArtifact, FeedPage, Identity, LikeEdge,
    LikeReceipt, Operation, UserId,
};

/// Who a feed session renders for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    /// Signed-in user, if any.
    pub user_id: Option<UserId>,
    /// Admins also see soft-deleted entries and may delete.
    pub admin: bool,
}

impl Viewer {
    /// A signed-out viewer.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A signed-in viewer without admin rights.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            admin: false,
        }
    }

    /// A signed-in admin.
    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            admin: true,
        }
    }

    /// Whether `user_id` is the signed-in user of this session.
    #[must_use]
    pub fn is(&self, user_id: &UserId) -> bool {
        self.user_id.as_ref() == Some(user_id)
    }
}

impl From<&Identity> for Viewer {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: Some(identity.user_id.clone()),
            admin: identity.is_admin(),
        }
    }
}

/// Where an entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Added locally, not yet seen from the server.
    OptimisticPending,
    /// Matches a server row.
    Confirmed,
    /// Soft-deleted (only admins keep these).
    SoftDeleted,
}

/// One rendered feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Last authoritative row (its `likes_count` excludes pending likes).
    pub artifact: EmojiArtifact,
    /// Lifecycle state.
    pub state: EntryState,
    /// Displayed like flag, including a pending toggle.
    pub is_liked_by_user: bool,
    /// Displayed like count, including a pending toggle.
    pub likes_count: i64,
}

/// Immutable view of a session's feed, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// Visible entries.
    pub entries: Vec<FeedEntry>,
    /// Timestamp of the last full load.
    pub as_of: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    /// Find an entry by id.
    #[must_use]
    pub fn get(&self, id: &ArtifactId) -> Option<&FeedEntry> {
        self.entries.iter().find(|e| e.artifact.id == *id)
    }
}

/// A local change applied before the server confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMutation {
    /// The viewer generated an artifact.
    Created(EmojiArtifact),
    /// The viewer liked or unliked an artifact.
    LikeToggled {
        /// Target.
        artifact_id: ArtifactId,
        /// New like state.
        liked: bool,
    },
    /// An admin soft-deleted an artifact.
    SoftDeleted(ArtifactId),
}

/// Why an event or mutation was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncConflict {
    /// The entry already reflects a write at or after this one.
    #[error("stale change for {artifact_id}: {observed_at} is not after {current}")]
    Stale {
        /// Target.
        artifact_id: ArtifactId,
        /// Timestamp of the dropped change.
        observed_at: DateTime<Utc>,
        /// Timestamp the entry already reflects.
        current: DateTime<Utc>,
    },

    /// The entry was deleted at or after this change.
    #[error("{artifact_id} was deleted at {deleted_at}")]
    Tombstoned {
        /// Target.
        artifact_id: ArtifactId,
        /// Delete timestamp.
        deleted_at: DateTime<Utc>,
    },

    /// No entry with this id.
    #[error("no feed entry for {0}")]
    UnknownEntity(ArtifactId),
}

/// Internal bookkeeping for one entry.
#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    artifact: EmojiArtifact,
    state: EntryState,
    /// Store time of the last authoritative write, `None` while only local.
    version: Option<DateTime<Utc>>,
    /// Confirmed like flag.
    liked: bool,
    pending_like: Option<bool>,
}

impl Tracked {
    fn from_row(artifact: EmojiArtifact, version: Option<DateTime<Utc>>, state: EntryState) -> Self {
        Self {
            artifact,
            state,
            version,
            liked: false,
            pending_like: None,
        }
    }

    fn displayed_liked(&self) -> bool {
        self.pending_like.unwrap_or(self.liked)
    }

    fn render(&self) -> FeedEntry {
        let liked = self.displayed_liked();
        let delta = match (self.liked, liked) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        };
        FeedEntry {
            artifact: self.artifact.clone(),
            state: self.state,
            is_liked_by_user: liked,
            likes_count: (self.artifact.likes_count + delta).max(0),
        }
    }
}

const fn row_state(artifact: &EmojiArtifact) -> EntryState {
    if artifact.deleted {
        EntryState::SoftDeleted
    } else {
        EntryState::Confirmed
    }
}

/// The state a [`super::FeedSynchronizer`] actor owns.
#[derive(Debug)]
pub(crate) struct FeedState {
    viewer: Viewer,
    entries: HashMap<ArtifactId, Tracked>,
    tombstones: HashMap<ArtifactId, DateTime<Utc>>,
    like_versions: HashMap<ArtifactId, DateTime<Utc>>,
    as_of: Option<DateTime<Utc>>,
}

impl FeedState {
    pub(crate) fn new(viewer: Viewer) -> Self {
        Self {
            viewer,
            entries: HashMap::new(),
            tombstones: HashMap::new(),
            like_versions: HashMap::new(),
            as_of: None,
        }
    }

    pub(crate) fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub(crate) fn entry(&self, id: &ArtifactId) -> Option<&Tracked> {
        self.entries.get(id)
    }

    /// The like flag currently displayed for `id`.
    pub(crate) fn displayed_liked(&self, id: &ArtifactId) -> Option<bool> {
        self.entries.get(id).map(Tracked::displayed_liked)
    }

    /// Merge a full listing taken at `page.as_of`.
    ///
    /// Rows are applied as writes stamped `as_of`, so anything this session already
    /// saw from a later change survives. Confirmed entries missing from the listing
    /// were removed before it and are dropped; local-only entries are kept.
    pub(crate) fn load(&mut self, page: FeedPage) {
        let as_of = page.as_of;
        let listed: HashSet<ArtifactId> = page.artifacts.iter().map(|a| a.id).collect();
        let liked: HashSet<ArtifactId> = page.liked_ids.into_iter().collect();

        self.entries
            .retain(|id, entry| listed.contains(id) || entry.version.map_or(true, |v| v > as_of));
        self.tombstones.retain(|_, deleted_at| *deleted_at > as_of);
        self.like_versions.retain(|_, v| *v > as_of);

        for artifact in page.artifacts {
            let id = artifact.id;
            if let Err(conflict) = self.upsert(artifact, as_of) {
                tracing::debug!(%conflict, "Listing row superseded");
            }
            if !self.like_versions.contains_key(&id) {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.liked = self.viewer.user_id.is_some() && liked.contains(&id);
                }
            }
        }

        self.as_of = Some(as_of);
    }

    /// Apply a local change ahead of the server.
    pub(crate) fn apply_optimistic(&mut self, mutation: FeedMutation) -> Result<(), SyncConflict> {
        match mutation {
            FeedMutation::Created(artifact) => {
                let id = artifact.id;
                if let Some(deleted_at) = self.tombstones.get(&id) {
                    return Err(SyncConflict::Tombstoned {
                        artifact_id: id,
                        deleted_at: *deleted_at,
                    });
                }
                self.entries.entry(id).or_insert_with(|| {
                    Tracked::from_row(artifact, None, EntryState::OptimisticPending)
                });
                Ok(())
            }
            FeedMutation::LikeToggled { artifact_id, liked } => {
                let entry = self
                    .entries
                    .get_mut(&artifact_id)
                    .ok_or(SyncConflict::UnknownEntity(artifact_id))?;
                entry.pending_like = Some(liked);
                Ok(())
            }
            FeedMutation::SoftDeleted(artifact_id) => {
                if !self.entries.contains_key(&artifact_id) {
                    return Err(SyncConflict::UnknownEntity(artifact_id));
                }
                if self.viewer.admin {
                    if let Some(entry) = self.entries.get_mut(&artifact_id) {
                        entry.artifact.deleted = true;
                        entry.state = EntryState::SoftDeleted;
                    }
                } else {
                    self.entries.remove(&artifact_id);
                }
                Ok(())
            }
        }
    }

    /// Apply a change event from the bus.
    pub(crate) fn apply_event(&mut self, event: ChangeEvent) -> Result<(), SyncConflict> {
        let observed_at = event.observed_at;
        match (event.payload, event.operation) {
            (ChangePayload::Artifact(artifact), Operation::Insert) => {
                self.insert(artifact, observed_at)
            }
            (ChangePayload::Artifact(artifact), Operation::Update) => {
                self.upsert(artifact, observed_at)
            }
            (ChangePayload::Artifact(artifact), Operation::Delete) => {
                self.remove(artifact.id, observed_at)
            }
            (ChangePayload::Like(edge), operation) => self.apply_edge(&edge, operation, observed_at),
        }
    }

    /// Settle a like with the server's receipt.
    pub(crate) fn confirm_like(&mut self, receipt: &LikeReceipt) {
        let id = receipt.artifact_id;
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.pending_like = None;

        if self
            .like_versions
            .get(&id)
            .map_or(true, |v| receipt.observed_at > *v)
        {
            entry.liked = receipt.liked;
            self.like_versions.insert(id, receipt.observed_at);
        }
        if entry.version.map_or(true, |v| receipt.observed_at > v) {
            entry.artifact.likes_count = receipt.likes_count;
            entry.version = Some(receipt.observed_at);
        }
    }

    /// Drop a pending like after the server refused it.
    pub(crate) fn rollback_like(&mut self, id: &ArtifactId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.pending_like = None;
        }
    }

    /// Settle a soft delete with the row the server returned.
    pub(crate) fn confirm_row(&mut self, artifact: &EmojiArtifact) {
        if !self.viewer.admin && artifact.deleted {
            self.entries.remove(&artifact.id);
        } else if let Some(entry) = self.entries.get_mut(&artifact.id) {
            entry.artifact.deleted = artifact.deleted;
            entry.state = row_state(artifact);
        }
    }

    /// Put an entry back the way it was before a failed operation.
    pub(crate) fn restore(&mut self, id: ArtifactId, previous: Option<Tracked>) {
        match previous {
            Some(entry) => {
                self.entries.insert(id, entry);
            }
            None => {
                self.entries.remove(&id);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> FeedSnapshot {
        let mut entries: Vec<FeedEntry> = self
            .entries
            .values()
            .filter(|e| e.artifact.visible_to(self.viewer.admin))
            .map(Tracked::render)
            .collect();
        entries.sort_by(|a, b| {
            b.artifact
                .created_at
                .cmp(&a.artifact.created_at)
                .then(b.artifact.id.cmp(&a.artifact.id))
        });
        FeedSnapshot {
            entries,
            as_of: self.as_of,
        }
    }

    fn check_tombstone(&self, id: ArtifactId, observed_at: DateTime<Utc>) -> Result<(), SyncConflict> {
        match self.tombstones.get(&id) {
            Some(deleted_at) if *deleted_at >= observed_at => Err(SyncConflict::Tombstoned {
                artifact_id: id,
                deleted_at: *deleted_at,
            }),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, artifact: EmojiArtifact, observed_at: DateTime<Utc>) -> Result<(), SyncConflict> {
        let id = artifact.id;
        self.check_tombstone(id, observed_at)?;

        match self.entries.get_mut(&id) {
            Some(entry) if entry.state == EntryState::OptimisticPending => {
                entry.state = EntryState::Confirmed;
                entry.version = Some(entry.version.map_or(observed_at, |v| v.max(observed_at)));
                Ok(())
            }
            Some(entry) => Err(SyncConflict::Stale {
                artifact_id: id,
                observed_at,
                current: entry.version.unwrap_or(observed_at),
            }),
            None => self.upsert(artifact, observed_at),
        }
    }

    fn upsert(&mut self, artifact: EmojiArtifact, observed_at: DateTime<Utc>) -> Result<(), SyncConflict> {
        let id = artifact.id;
        self.check_tombstone(id, observed_at)?;

        if !self.viewer.admin && artifact.deleted {
            return self.remove(id, observed_at);
        }

        match self.entries.get_mut(&id) {
            Some(entry) => {
                if let Some(current) = entry.version {
                    if observed_at <= current {
                        return Err(SyncConflict::Stale {
                            artifact_id: id,
                            observed_at,
                            current,
                        });
                    }
                }
                entry.state = row_state(&artifact);
                entry.artifact = artifact;
                entry.version = Some(observed_at);
            }
            None => {
                let state = row_state(&artifact);
                self.entries
                    .insert(id, Tracked::from_row(artifact, Some(observed_at), state));
            }
        }
        Ok(())
    }

    /// Delete wins ties with the write it races.
    fn remove(&mut self, id: ArtifactId, observed_at: DateTime<Utc>) -> Result<(), SyncConflict> {
        self.check_tombstone(id, observed_at)?;

        if let Some(current) = self.entries.get(&id).and_then(|e| e.version) {
            if observed_at < current {
                return Err(SyncConflict::Stale {
                    artifact_id: id,
                    observed_at,
                    current,
                });
            }
        }
        self.entries.remove(&id);
        self.tombstones.insert(id, observed_at);
        Ok(())
    }

    fn apply_edge(
        &mut self,
        edge: &LikeEdge,
        operation: Operation,
        observed_at: DateTime<Utc>,
    ) -> Result<(), SyncConflict> {
        // Other users' likes reach the count through the artifact row.
        if !self.viewer.is(&edge.user_id) {
            return Ok(());
        }
        let id = edge.artifact_id;
        if let Some(current) = self.like_versions.get(&id) {
            if observed_at <= *current {
                return Err(SyncConflict::Stale {
                    artifact_id: id,
                    observed_at,
                    current: *current,
                });
            }
        }

        let liked = match operation {
            Operation::Insert => true,
            Operation::Delete => false,
            Operation::Update => return Ok(()),
        };
        self.like_versions.insert(id, observed_at);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.liked = liked;
        }
        Ok(())
    }
}
