//! Change events emitted by the persistence layer.
//!
//! Every write to an artifact row or like edge produces one [`ChangeEvent`]. Delivery
//! is at-least-once and unordered across entities; consumers order updates to the
//! same entity by `observed_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArtifactId, EmojiArtifact, LikeEdge};

/// A notification that a shared entity changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub operation: Operation,
    /// The entity after the change (before it, for deletes).
    pub payload: ChangePayload,
    /// Store timestamp of the change.
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an artifact event.
    #[must_use]
    pub fn artifact(operation: Operation, artifact: EmojiArtifact, observed_at: DateTime<Utc>) -> Self {
        Self {
            operation,
            payload: ChangePayload::Artifact(artifact),
            observed_at,
        }
    }

    /// Create a like edge event.
    #[must_use]
    pub fn like(operation: Operation, edge: LikeEdge, observed_at: DateTime<Utc>) -> Self {
        Self {
            operation,
            payload: ChangePayload::Like(edge),
            observed_at,
        }
    }

    /// The kind of entity this event is about.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self.payload {
            ChangePayload::Artifact(_) => EntityType::Artifact,
            ChangePayload::Like(_) => EntityType::Like,
        }
    }

    /// The artifact this event concerns, directly or through a like edge.
    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        match &self.payload {
            ChangePayload::Artifact(artifact) => artifact.id,
            ChangePayload::Like(edge) => edge.artifact_id,
        }
    }
}

/// Entity carried by a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity", rename_all = "snake_case")]
pub enum ChangePayload {
    /// An artifact row.
    Artifact(EmojiArtifact),
    /// A like edge.
    Like(LikeEdge),
}

/// Entity kinds, one per push topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Artifact rows.
    Artifact,
    /// Like edges.
    Like,
}

impl EntityType {
    /// Name of the push topic carrying this entity type.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Artifact => "artifacts",
            Self::Like => "likes",
        }
    }
}

/// Row operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Row created.
    Insert,
    /// Row changed.
    Update,
    /// Row removed.
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewArtifact, UserId};

    #[test]
    fn entity_type_follows_payload() {
        let artifact = EmojiArtifact::from_new(NewArtifact {
            image_url: "https://cdn.test/a.png".into(),
            prompt: "a cat".into(),
            creator_id: UserId::generate(),
        });
        let edge = LikeEdge::new(UserId::generate(), artifact.id);

        let a = ChangeEvent::artifact(Operation::Insert, artifact.clone(), Utc::now());
        let l = ChangeEvent::like(Operation::Delete, edge, Utc::now());

        assert_eq!(a.entity_type(), EntityType::Artifact);
        assert_eq!(l.entity_type(), EntityType::Like);
        assert_eq!(l.artifact_id(), artifact.id);
        assert_eq!(EntityType::Like.topic(), "likes");
    }

    #[test]
    fn wire_shape() {
        let edge = LikeEdge::new(UserId::new("user_1").unwrap(), crate::ArtifactId::generate());
        let event = ChangeEvent::like(Operation::Insert, edge, Utc::now());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["operation"], "INSERT");
        assert_eq!(json["payload"]["entity_type"], "like");
        assert_eq!(json["payload"]["entity"]["user_id"], "user_1");

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
