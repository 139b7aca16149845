//! Change-feed relay over WebSocket.
//!
//! Each connection subscribes to the store's change feed and forwards every event
//! as a JSON text frame. Non-admin viewers never see deleted rows: a soft delete is
//! relayed to them as a `DELETE`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use emoji_core::{ChangeEvent, ChangePayload, Identity, Operation};

use crate::auth::OptionalAuthUser;
use crate::state::AppState;

/// Route of the change stream. Browsers cannot set headers on a WebSocket upgrade,
/// so this route also accepts the token as an `access_token` query parameter.
pub const STREAM_PATH: &str = "/v1/feed/stream";

/// One relayed change event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    /// `artifacts` or `likes`.
    pub topic: &'static str,
    /// `INSERT`, `UPDATE` or `DELETE`.
    pub event_type: Operation,
    /// The changed row.
    pub entity: serde_json::Value,
    /// Store timestamp of the change.
    pub observed_at: DateTime<Utc>,
}

impl StreamMessage {
    /// Project an event for a viewer.
    #[must_use]
    pub fn for_viewer(event: &ChangeEvent, admin: bool) -> Self {
        let (event_type, entity) = match &event.payload {
            ChangePayload::Artifact(artifact) => {
                let op = if !admin && artifact.deleted {
                    Operation::Delete
                } else {
                    event.operation
                };
                (op, serde_json::to_value(artifact))
            }
            ChangePayload::Like(edge) => (event.operation, serde_json::to_value(edge)),
        };

        Self {
            topic: event.entity_type().topic(),
            event_type,
            entity: entity.unwrap_or(serde_json::Value::Null),
            observed_at: event.observed_at,
        }
    }
}

/// Sent instead of the skipped events when a connection falls behind.
#[derive(Debug, Serialize)]
struct ResyncNotice {
    resync: bool,
    skipped: u64,
}

/// Upgrade to a WebSocket streaming change events.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(identity): OptionalAuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let admin = identity.as_ref().is_some_and(Identity::is_admin);
    let events = state.store.subscribe();
    tracing::debug!(
        user_id = ?identity.as_ref().map(|i| i.user_id.to_string()),
        admin,
        "Feed stream connected"
    );
    ws.on_upgrade(move |socket| relay(socket, events, admin))
}

async fn relay(socket: WebSocket, mut events: broadcast::Receiver<ChangeEvent>, admin: bool) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => {
                let frame = match event {
                    Ok(event) => serde_json::to_string(&StreamMessage::for_viewer(&event, admin)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Feed stream lagged, asking client to resync");
                        serde_json::to_string(&ResyncNotice { resync: true, skipped })
                    }
                    Err(RecvError::Closed) => break,
                };
                let Ok(text) = frame else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    None | Some(Err(_) | Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    tracing::debug!("Feed stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use emoji_core::{ArtifactId, EmojiArtifact, LikeEdge, NewArtifact, UserId};

    fn deleted_artifact() -> EmojiArtifact {
        let mut artifact = EmojiArtifact::from_new(NewArtifact {
            image_url: "https://cdn.test/a.png".into(),
            prompt: "a cat".into(),
            creator_id: UserId::generate(),
        });
        artifact.deleted = true;
        artifact
    }

    #[test]
    fn soft_delete_reads_as_delete_for_viewers() {
        let event = ChangeEvent::artifact(Operation::Update, deleted_artifact(), Utc::now());

        let viewer = StreamMessage::for_viewer(&event, false);
        assert_eq!(viewer.event_type, Operation::Delete);

        let admin = StreamMessage::for_viewer(&event, true);
        assert_eq!(admin.event_type, Operation::Update);
        assert_eq!(admin.entity["deleted"], true);
    }

    #[test]
    fn wire_shape() {
        let edge = LikeEdge::new(UserId::generate(), ArtifactId::generate());
        let event = ChangeEvent::like(Operation::Insert, edge, Utc::now());
        let json = serde_json::to_value(StreamMessage::for_viewer(&event, false)).unwrap();

        assert_eq!(json["topic"], "likes");
        assert_eq!(json["eventType"], "INSERT");
        assert!(json["entity"]["artifact_id"].is_string());
        assert!(json["observedAt"].is_string());
    }
}
