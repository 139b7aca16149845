//! Emoji Client SDK.
//!
//! This crate provides a client library for the emoji service: an HTTP client for
//! profiles, credits, generation and the feed, and a [`FeedSynchronizer`] that keeps
//! one viewer's feed in sync with optimistic local changes and the service's change
//! events.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use emoji_client::{EmojiClient, FeedSynchronizer, Viewer};
//! use emoji_core::UserId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = EmojiClient::new("http://localhost:8080")?.with_access_token("jwt");
//!
//! let profile = client.ensure_profile().await?;
//! let user_id: UserId = profile.user_id.parse()?;
//!
//! let feed = FeedSynchronizer::spawn(Viewer::user(user_id.clone()), Arc::new(client.clone()));
//! feed.initialize().await?;
//!
//! let generated = client.generate("cat wearing a party hat").await?;
//! feed.toggle_like(&user_id, generated.artifact.id).await?;
//!
//! for entry in &feed.snapshot().entries {
//!     println!("{} ({} likes)", entry.artifact.prompt, entry.likes_count);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod backend;
mod client;
mod error;
pub mod sync;
mod types;

pub use backend::FeedBackend;
pub use client::{ClientOptions, EmojiClient};
pub use error::{ClientError, FeedError, LikeError};
pub use sync::{
    ChangeEventBus, EntryState, FeedEntry, FeedMutation, FeedSnapshot, FeedSynchronizer,
    StreamFrame, SyncConflict, Viewer,
};
pub use types::*;
