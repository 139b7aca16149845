//! Core types for the emoji generation service.
//!
//! This crate provides the foundational types shared by the store, the HTTP service
//! and the client SDK:
//!
//! - **Identifiers**: `UserId`, `ArtifactId`, `ReservationId`, `JobId`
//! - **Credits**: `CreditAccount`, `Reservation`, `Settlement`
//! - **Generation**: `GenerationJob`, `JobStatus`
//! - **Feed**: `EmojiArtifact`, `LikeEdge`, `FeedPage`, `LikeReceipt`
//! - **Change events**: `ChangeEvent`, `ChangePayload`, `Operation`
//! - **Identity**: `Identity`, `Capabilities`
//!
//! # Credits
//!
//! One successful generation costs [`GENERATION_COST`] credit. New accounts start
//! with [`DEFAULT_STARTING_CREDITS`]. Balances are plain `i64` and never negative.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod artifact;
pub mod error;
pub mod event;
pub mod identity;
pub mod ids;
pub mod job;
pub mod reservation;

pub use account::{CreditAccount, Tier, DEFAULT_STARTING_CREDITS, GENERATION_COST};
pub use artifact::{sort_newest_first, EmojiArtifact, FeedPage, LikeEdge, LikeReceipt, NewArtifact};
pub use error::{GenerationError, LedgerError, Result};
pub use event::{ChangeEvent, ChangePayload, EntityType, Operation};
pub use identity::{Capabilities, Identity};
pub use ids::{ArtifactId, IdError, JobId, ReservationId, UserId};
pub use job::{GenerationJob, InvalidTransition, JobStatus};
pub use reservation::{Reservation, ReservationState, Settlement};
