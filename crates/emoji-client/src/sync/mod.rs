//! Real-time feed synchronization.
//!
//! A [`FeedSynchronizer`] is one viewer's session. A single task owns the feed state
//! and handles every mutation in arrival order: loads, optimistic changes, backend
//! confirmations and change events all go through the same queue. Readers get
//! immutable snapshots through a `watch` channel and never block the task.

pub mod bus;
mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use emoji_core::{ArtifactId, ChangeEvent, LikeReceipt, UserId};

use crate::backend::FeedBackend;
use crate::error::{FeedError, LikeError};
use state::FeedState;

pub use bus::{ChangeEventBus, StreamFrame};
pub use state::{EntryState, FeedEntry, FeedMutation, FeedSnapshot, SyncConflict, Viewer};

/// Commands queued for the session task.
const COMMAND_QUEUE_DEPTH: usize = 256;

enum Command {
    Initialize {
        response: oneshot::Sender<Result<Vec<FeedEntry>, FeedError>>,
    },
    Optimistic {
        mutation: FeedMutation,
        response: oneshot::Sender<Result<(), SyncConflict>>,
    },
    Change(ChangeEvent),
    ToggleLike {
        user_id: UserId,
        artifact_id: ArtifactId,
        response: oneshot::Sender<Result<LikeReceipt, LikeError>>,
    },
    SoftDelete {
        artifact_id: ArtifactId,
        response: oneshot::Sender<Result<(), FeedError>>,
    },
}

/// Handle to one viewer's feed session.
///
/// Cloning the handle shares the session. The session task stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct FeedSynchronizer {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<FeedSnapshot>>,
    viewer: Viewer,
}

impl FeedSynchronizer {
    /// Start a session for `viewer`. Call [`Self::initialize`] to load the feed.
    #[must_use]
    pub fn spawn(viewer: Viewer, backend: Arc<dyn FeedBackend>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(FeedSnapshot::default()));

        let session = Session {
            state: FeedState::new(viewer.clone()),
            backend,
            snapshots: snapshot_tx,
        };
        tokio::spawn(session.run(rx));

        Self {
            commands: tx,
            snapshots: snapshot_rx,
            viewer,
        }
    }

    /// The viewer this session renders for.
    #[must_use]
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots as they change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.snapshots.clone()
    }

    /// Load the feed from the backend and merge it into the session.
    ///
    /// Pending optimistic entries and changes newer than the listing are kept.
    ///
    /// # Errors
    ///
    /// `FeedError::Backend` if the load fails (the previous state stays in place).
    pub async fn initialize(&self) -> Result<Vec<FeedEntry>, FeedError> {
        let (response, rx) = oneshot::channel();
        self.send(Command::Initialize { response }).await?;
        rx.await.map_err(|_| FeedError::Closed)?
    }

    /// Full reload after missed change events.
    ///
    /// # Errors
    ///
    /// Same as [`Self::initialize`].
    pub async fn resync(&self) -> Result<(), FeedError> {
        self.initialize().await.map(|_| ())
    }

    /// Apply a local change ahead of the server.
    ///
    /// # Errors
    ///
    /// `FeedError::UnknownArtifact` if the change targets an entry the feed does not
    /// hold; `FeedError::Closed` if the session stopped.
    pub async fn apply_optimistic(&self, mutation: FeedMutation) -> Result<(), FeedError> {
        let (response, rx) = oneshot::channel();
        self.send(Command::Optimistic { mutation, response }).await?;
        match rx.await.map_err(|_| FeedError::Closed)? {
            Ok(()) => Ok(()),
            Err(SyncConflict::UnknownEntity(id) | SyncConflict::Tombstoned { artifact_id: id, .. }) => {
                Err(FeedError::UnknownArtifact(id))
            }
            Err(SyncConflict::Stale { .. }) => Ok(()),
        }
    }

    /// Queue a change event. Conflicting events are dropped inside the session.
    ///
    /// # Errors
    ///
    /// `FeedError::Closed` if the session stopped.
    pub async fn apply_change_event(&self, event: ChangeEvent) -> Result<(), FeedError> {
        self.send(Command::Change(event)).await
    }

    /// Flip the viewer's like on an artifact.
    ///
    /// The flip is shown at once and settled with the server's receipt; on error the
    /// displayed state goes back to what it was.
    ///
    /// # Errors
    ///
    /// - `LikeError::NotSignedIn` if `user_id` is not the session's signed-in user.
    /// - `LikeError::UnknownArtifact` if the artifact is not in the feed.
    /// - `LikeError::Backend` if the server call failed.
    pub async fn toggle_like(
        &self,
        user_id: &UserId,
        artifact_id: ArtifactId,
    ) -> Result<LikeReceipt, LikeError> {
        if !self.viewer.is(user_id) {
            return Err(LikeError::NotSignedIn);
        }
        let (response, rx) = oneshot::channel();
        self.commands
            .send(Command::ToggleLike {
                user_id: user_id.clone(),
                artifact_id,
                response,
            })
            .await
            .map_err(|_| LikeError::Closed)?;
        rx.await.map_err(|_| LikeError::Closed)?
    }

    /// Soft-delete an artifact (admin sessions only).
    ///
    /// # Errors
    ///
    /// - `FeedError::Forbidden` for non-admin viewers.
    /// - `FeedError::UnknownArtifact` if the artifact is not in the feed.
    /// - `FeedError::Backend` if the server call failed; the entry is restored.
    pub async fn soft_delete(&self, artifact_id: ArtifactId) -> Result<(), FeedError> {
        if !self.viewer.admin {
            return Err(FeedError::Forbidden);
        }
        let (response, rx) = oneshot::channel();
        self.send(Command::SoftDelete {
            artifact_id,
            response,
        })
        .await?;
        rx.await.map_err(|_| FeedError::Closed)?
    }

    async fn send(&self, command: Command) -> Result<(), FeedError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FeedError::Closed)
    }
}

/// The task side of a session.
struct Session {
    state: FeedState,
    backend: Arc<dyn FeedBackend>,
    snapshots: watch::Sender<Arc<FeedSnapshot>>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Initialize { response } => {
                    let result = self.initialize().await;
                    let _ = response.send(result);
                }
                Command::Optimistic { mutation, response } => {
                    let result = self.state.apply_optimistic(mutation);
                    self.publish();
                    let _ = response.send(result);
                }
                Command::Change(event) => {
                    let artifact_id = event.artifact_id();
                    let operation = event.operation;
                    match self.state.apply_event(event) {
                        Ok(()) => self.publish(),
                        Err(conflict) => {
                            tracing::debug!(%artifact_id, ?operation, %conflict, "Change event dropped");
                        }
                    }
                }
                Command::ToggleLike {
                    user_id,
                    artifact_id,
                    response,
                } => {
                    let result = self.toggle_like(&user_id, artifact_id).await;
                    let _ = response.send(result);
                }
                Command::SoftDelete {
                    artifact_id,
                    response,
                } => {
                    let result = self.soft_delete(artifact_id).await;
                    let _ = response.send(result);
                }
            }
        }
        tracing::debug!(viewer = ?self.state.viewer().user_id, "Feed session closed");
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.state.snapshot()));
    }

    async fn initialize(&mut self) -> Result<Vec<FeedEntry>, FeedError> {
        let page = self.backend.load_feed().await?;
        tracing::debug!(
            artifacts = page.artifacts.len(),
            as_of = %page.as_of,
            "Feed loaded"
        );
        self.state.load(page);
        self.publish();
        Ok(self.snapshots.borrow().entries.clone())
    }

    async fn toggle_like(
        &mut self,
        user_id: &UserId,
        artifact_id: ArtifactId,
    ) -> Result<LikeReceipt, LikeError> {
        let liked = !self
            .state
            .displayed_liked(&artifact_id)
            .ok_or(LikeError::UnknownArtifact(artifact_id))?;

        self.state
            .apply_optimistic(FeedMutation::LikeToggled { artifact_id, liked })
            .map_err(|_| LikeError::UnknownArtifact(artifact_id))?;
        self.publish();

        let result = if liked {
            self.backend.like(&artifact_id).await
        } else {
            self.backend.unlike(&artifact_id).await
        };

        match result {
            Ok(receipt) => {
                self.state.confirm_like(&receipt);
                self.publish();
                tracing::debug!(
                    user_id = %user_id,
                    artifact_id = %artifact_id,
                    liked = receipt.liked,
                    likes = receipt.likes_count,
                    "Like confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.state.rollback_like(&artifact_id);
                self.publish();
                tracing::warn!(user_id = %user_id, artifact_id = %artifact_id, error = %e, "Like rolled back");
                Err(LikeError::Backend(e))
            }
        }
    }

    async fn soft_delete(&mut self, artifact_id: ArtifactId) -> Result<(), FeedError> {
        let previous = self.state.entry(&artifact_id).cloned();
        if previous.is_none() {
            return Err(FeedError::UnknownArtifact(artifact_id));
        }

        self.state
            .apply_optimistic(FeedMutation::SoftDeleted(artifact_id))
            .map_err(|_| FeedError::UnknownArtifact(artifact_id))?;
        self.publish();

        match self.backend.soft_delete(&artifact_id).await {
            Ok(row) => {
                self.state.confirm_row(&row);
                self.publish();
                tracing::info!(artifact_id = %artifact_id, "Artifact soft-deleted");
                Ok(())
            }
            Err(e) => {
                self.state.restore(artifact_id, previous);
                self.publish();
                tracing::warn!(artifact_id = %artifact_id, error = %e, "Soft delete restored");
                Err(FeedError::Backend(e))
            }
        }
    }
}
