//! Feeding change events into a session.
//!
//! [`ChangeEventBus`] pumps an in-process broadcast subscription into a
//! [`FeedSynchronizer`]. Remote transports decode the service's stream frames with
//! [`StreamFrame::decode`] and hand them over with [`StreamFrame::deliver`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use emoji_core::{ChangeEvent, EmojiArtifact, LikeEdge, Operation};

use super::FeedSynchronizer;
use crate::error::{ClientError, FeedError};

/// Forwards a change feed subscription into a feed session.
///
/// Delivery is at-least-once and unordered; the session drops stale events. When
/// the subscription lags, the skipped events are unknown and the session reloads.
pub struct ChangeEventBus {
    events: broadcast::Receiver<ChangeEvent>,
    feed: FeedSynchronizer,
}

impl ChangeEventBus {
    /// Connect a subscription to a session.
    #[must_use]
    pub fn new(events: broadcast::Receiver<ChangeEvent>, feed: FeedSynchronizer) -> Self {
        Self { events, feed }
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Forward events until the feed closes or the session stops.
    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    if self.feed.apply_change_event(event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change feed lagged, resyncing");
                    match self.feed.resync().await {
                        Ok(()) => {}
                        Err(FeedError::Closed) => break,
                        Err(e) => tracing::warn!(error = %e, "Resync failed"),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Change event bus stopped");
    }
}

/// One frame of the service's feed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A row changed.
    Change(ChangeEvent),
    /// The server dropped frames for this connection; reload.
    Resync {
        /// Frames skipped.
        skipped: u64,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Resync { resync: bool, skipped: u64 },
    Change(RawChange),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChange {
    topic: String,
    event_type: Operation,
    entity: serde_json::Value,
    observed_at: DateTime<Utc>,
}

fn invalid(message: String) -> ClientError {
    ClientError::Serialization(<serde_json::Error as serde::de::Error>::custom(message))
}

impl StreamFrame {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// `ClientError::Serialization` for malformed frames or unknown topics.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        match serde_json::from_str::<RawFrame>(text)? {
            RawFrame::Resync {
                resync: true,
                skipped,
            } => Ok(Self::Resync { skipped }),
            RawFrame::Resync { resync: false, .. } => Err(invalid("resync frame without resync flag".into())),
            RawFrame::Change(raw) => {
                let event = match raw.topic.as_str() {
                    "artifacts" => ChangeEvent::artifact(
                        raw.event_type,
                        serde_json::from_value::<EmojiArtifact>(raw.entity)?,
                        raw.observed_at,
                    ),
                    "likes" => ChangeEvent::like(
                        raw.event_type,
                        serde_json::from_value::<LikeEdge>(raw.entity)?,
                        raw.observed_at,
                    ),
                    other => return Err(invalid(format!("unknown topic: {other}"))),
                };
                Ok(Self::Change(event))
            }
        }
    }

    /// Hand the frame to a session.
    ///
    /// # Errors
    ///
    /// `FeedError::Closed` if the session stopped, or the resync error.
    pub async fn deliver(self, feed: &FeedSynchronizer) -> Result<(), FeedError> {
        match self {
            Self::Change(event) => feed.apply_change_event(event).await,
            Self::Resync { skipped } => {
                tracing::warn!(skipped, "Server skipped stream frames, resyncing");
                feed.resync().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use emoji_core::{ArtifactId, FeedPage, LikeReceipt, NewArtifact, UserId};

    use crate::backend::FeedBackend;
    use crate::sync::Viewer;

    struct CountingBackend {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl FeedBackend for CountingBackend {
        async fn load_feed(&self) -> Result<FeedPage, ClientError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(FeedPage {
                artifacts: vec![],
                liked_ids: vec![],
                as_of: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            })
        }

        async fn like(&self, _: &ArtifactId) -> Result<LikeReceipt, ClientError> {
            Err(ClientError::Unauthorized)
        }

        async fn unlike(&self, _: &ArtifactId) -> Result<LikeReceipt, ClientError> {
            Err(ClientError::Unauthorized)
        }

        async fn soft_delete(&self, _: &ArtifactId) -> Result<EmojiArtifact, ClientError> {
            Err(ClientError::Unauthorized)
        }
    }

    fn artifact(prompt: &str) -> EmojiArtifact {
        EmojiArtifact::from_new(NewArtifact {
            image_url: format!("https://cdn.test/{prompt}.png"),
            prompt: prompt.to_string(),
            creator_id: UserId::generate(),
        })
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn forwards_events_into_session() {
        let backend = Arc::new(CountingBackend {
            loads: AtomicUsize::new(0),
        });
        let feed = FeedSynchronizer::spawn(Viewer::anonymous(), backend);
        let (tx, rx) = broadcast::channel(16);
        let _bus = ChangeEventBus::new(rx, feed.clone()).spawn();

        let cat = artifact("cat");
        tx.send(ChangeEvent::artifact(Operation::Insert, cat.clone(), Utc::now()))
            .unwrap();

        wait_for(|| feed.snapshot().get(&cat.id).is_some()).await;
    }

    #[tokio::test]
    async fn lag_triggers_resync() {
        let backend = Arc::new(CountingBackend {
            loads: AtomicUsize::new(0),
        });
        let feed = FeedSynchronizer::spawn(Viewer::anonymous(), backend.clone());
        let (tx, rx) = broadcast::channel(2);

        // Overflow the subscription before the bus starts reading.
        for i in 0..5 {
            tx.send(ChangeEvent::artifact(
                Operation::Insert,
                artifact(&format!("a{i}")),
                Utc::now(),
            ))
            .unwrap();
        }
        let _bus = ChangeEventBus::new(rx, feed.clone()).spawn();

        wait_for(|| backend.loads.load(Ordering::SeqCst) == 1).await;
        // The two events still buffered are applied after the reload.
        wait_for(|| feed.snapshot().entries.len() == 2).await;
    }

    #[test]
    fn decodes_artifact_frame() {
        let cat = artifact("cat");
        let text = serde_json::json!({
            "topic": "artifacts",
            "eventType": "DELETE",
            "entity": cat,
            "observedAt": "2025-01-01T00:00:00Z"
        })
        .to_string();

        let StreamFrame::Change(event) = StreamFrame::decode(&text).unwrap() else {
            panic!("expected change frame");
        };
        assert_eq!(event.operation, Operation::Delete);
        assert_eq!(event.artifact_id(), cat.id);
    }

    #[test]
    fn decodes_like_and_resync_frames() {
        let edge = LikeEdge::new(UserId::generate(), ArtifactId::generate());
        let text = serde_json::json!({
            "topic": "likes",
            "eventType": "INSERT",
            "entity": edge,
            "observedAt": "2025-01-01T00:00:00Z"
        })
        .to_string();
        assert!(matches!(
            StreamFrame::decode(&text).unwrap(),
            StreamFrame::Change(ChangeEvent { operation: Operation::Insert, .. })
        ));

        assert_eq!(
            StreamFrame::decode(r#"{"resync":true,"skipped":12}"#).unwrap(),
            StreamFrame::Resync { skipped: 12 }
        );
    }

    #[test]
    fn rejects_unknown_topic() {
        let text = r#"{"topic":"users","eventType":"INSERT","entity":{},"observedAt":"2025-01-01T00:00:00Z"}"#;
        assert!(matches!(
            StreamFrame::decode(text),
            Err(ClientError::Serialization(_))
        ));
    }
}
