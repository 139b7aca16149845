//! Emoji HTTP API Service.
//!
//! This crate provides the HTTP API for the emoji generator, including:
//!
//! - Profiles and credit balances
//! - Emoji generation through an inference provider, paid for with one credit
//! - The shared feed: listing, likes and admin moderation
//! - A WebSocket relay of feed change events
//!
//! # Authentication
//!
//! End users sign in with JWTs verified against the auth provider's JWKS. Admin
//! rights come from a `admin` role claim or from the configured admin email list.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod replicate;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{CreditLedger, ReservationToken};
pub use orchestrator::{GenerationConfig, JobOrchestrator};
pub use provider::{InferenceProvider, Prediction, PredictionStatus, ProviderError};
pub use replicate::ReplicateClient;
pub use routes::create_router;
pub use state::AppState;
