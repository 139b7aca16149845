//! Replicate integration.
//!
//! Predictions are created against a pinned model version and polled by ID until
//! they reach a terminal status.

pub mod client;
pub mod types;

pub use client::ReplicateClient;
pub use types::*;
