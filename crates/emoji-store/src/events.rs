//! Change feed emitted by persistence writes.
//!
//! Every store owns a [`ChangeFeed`]. Writes publish a [`ChangeEvent`] after they
//! commit; subscribers receive them over a bounded broadcast channel. A subscriber
//! that falls behind observes `RecvError::Lagged` and is expected to resynchronize.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use emoji_core::ChangeEvent;

/// Default number of buffered events per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Broadcast channel for change events plus the store's logical clock.
#[derive(Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    last_stamp: Mutex<DateTime<Utc>>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            last_stamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::trace!(
            entity = ?event.entity_type(),
            operation = ?event.operation,
            artifact_id = %event.artifact_id(),
            "Publishing change event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Return a timestamp strictly greater than any previously returned one.
    ///
    /// Wall-clock time is used when it moves forward; otherwise the previous stamp is
    /// bumped by one microsecond so per-entity ordering never ties.
    pub fn stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock();
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + chrono::Duration::microseconds(1)
        };
        *last = next;
        next
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
