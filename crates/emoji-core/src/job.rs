//! Generation jobs.
//!
//! A job lives only as long as one `generate` call. Its status moves
//! `Submitted → Polling → {Succeeded | Failed | TimedOut}`; a provider that answers
//! synchronously may move a job straight from `Submitted` to a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, UserId};

/// An in-flight generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Provider job ID, known once the submission was accepted.
    pub job_id: Option<JobId>,
    /// The requesting user.
    pub user_id: UserId,
    /// The user's prompt.
    pub prompt: String,
    /// Current status.
    pub status: JobStatus,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a job in the `Submitted` state.
    #[must_use]
    pub fn new(user_id: UserId, prompt: impl Into<String>) -> Self {
        Self {
            job_id: None,
            user_id,
            prompt: prompt.into(),
            status: JobStatus::Submitted,
            created_at: Utc::now(),
        }
    }

    /// Move the job to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` is not reachable from the current status.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted locally, submission in progress.
    Submitted,
    /// Submitted to the provider, waiting for a terminal status.
    Polling,
    /// Provider produced an output.
    Succeeded,
    /// Provider reported failure, or the provider could not be reached.
    Failed,
    /// The poll deadline passed.
    TimedOut,
}

impl JobStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Submitted => !matches!(next, Self::Submitted),
            Self::Polling => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::TimedOut => false,
        }
    }
}

/// Rejected job status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// The current status.
    pub from: JobStatus,
    /// The requested status.
    pub to: JobStatus,
}
