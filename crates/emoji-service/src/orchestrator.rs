//! Generation job orchestration.
//!
//! A `generate` call reserves one credit, submits the prompt to the inference
//! provider, polls until a terminal status or the deadline, and then either records
//! the artifact (consuming the credit) or refunds the credit. Every path settles the
//! reservation exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use emoji_core::{
    EmojiArtifact, GenerationError, GenerationJob, JobStatus, NewArtifact, UserId,
};
use emoji_store::{BlobStore, ObjectPath, Store};

use crate::config::ServiceConfig;
use crate::ledger::{CreditLedger, ReservationToken};
use crate::provider::{InferenceProvider, Prediction, PredictionStatus, ProviderError};

/// Text prepended to every user prompt before submission.
pub const PROMPT_PREFIX: &str = "Generate a TOK emoji of a ";

/// Maximum prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 500;

/// Content type of stored artifact images.
const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Poll cadence and output handling.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Deadline for a job, measured from submission.
    pub poll_timeout: Duration,
    /// Copy outputs into the blob store instead of linking the provider URL.
    pub mirror_outputs: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(30),
            mirror_outputs: true,
        }
    }
}

impl From<&ServiceConfig> for GenerationConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
            mirror_outputs: config.mirror_outputs,
        }
    }
}

/// Trim and bound a prompt.
///
/// # Errors
///
/// Returns `GenerationError::InvalidPrompt` if the prompt is blank or too long.
pub fn validate_prompt(prompt: &str) -> Result<String, GenerationError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(GenerationError::InvalidPrompt("Prompt is required".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(GenerationError::InvalidPrompt(format!(
            "Prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(prompt.to_string())
}

fn advance(job: &mut GenerationJob, next: JobStatus) {
    let result = job.transition(next);
    debug_assert!(result.is_ok(), "{result:?}");
    if let Err(e) = result {
        tracing::warn!(error = %e, "Ignoring job transition");
    }
}

/// Drives generation jobs from reservation to recorded artifact.
#[derive(Clone)]
pub struct JobOrchestrator {
    ledger: Arc<CreditLedger>,
    provider: Arc<dyn InferenceProvider>,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    config: GenerationConfig,
}

impl JobOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        ledger: Arc<CreditLedger>,
        provider: Arc<dyn InferenceProvider>,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            ledger,
            provider,
            store,
            blobs,
            config,
        }
    }

    /// Generate an emoji for `user_id` and record it in the feed.
    ///
    /// Once the credit is reserved the job runs on its own task, so the reservation
    /// settles even if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// - `InvalidPrompt` / `InsufficientCredits`: rejected before any provider call.
    /// - `ProviderFailed` / `ProviderTimeout`: the credit was refunded.
    /// - `Storage`: generation succeeded but recording it failed; the credit stays
    ///   consumed.
    pub async fn generate(
        &self,
        user_id: &UserId,
        prompt: &str,
    ) -> Result<EmojiArtifact, GenerationError> {
        let prompt = validate_prompt(prompt)?;
        let token = self.ledger.reserve(user_id)?;
        let job = GenerationJob::new(user_id.clone(), prompt);

        let this = self.clone();
        tokio::spawn(async move { this.settle(job, token).await })
            .await
            .unwrap_or_else(|e| {
                tracing::error!(user_id = %user_id, error = %e, "Generation task aborted");
                Err(GenerationError::Storage(format!("generation task aborted: {e}")))
            })
    }

    /// Run a reserved job to the end and settle its reservation.
    async fn settle(
        &self,
        mut job: GenerationJob,
        token: ReservationToken,
    ) -> Result<EmojiArtifact, GenerationError> {
        let output_url = match self.run_job(&mut job).await {
            Ok(url) => url,
            Err(err) => {
                self.refund(&token);
                tracing::warn!(
                    user_id = %job.user_id,
                    job_id = ?job.job_id,
                    status = ?job.status,
                    error = %err,
                    "Generation failed, credit refunded"
                );
                return Err(err);
            }
        };

        if let Err(e) = self.ledger.consume(&token) {
            tracing::error!(user_id = %job.user_id, error = %e, "Failed to mark reservation consumed");
        }

        self.record(&job, output_url).await
    }

    /// Submit and poll until a terminal status or the deadline. Returns the output URL.
    async fn run_job(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let deadline = Instant::now() + self.config.poll_timeout;
        let outcome = tokio::time::timeout_at(deadline, self.poll_until_terminal(job)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                advance(job, JobStatus::TimedOut);
                Err(GenerationError::ProviderTimeout(self.config.poll_timeout))
            }
        }
    }

    async fn poll_until_terminal(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let full_prompt = format!("{PROMPT_PREFIX}{}", job.prompt);
        let mut prediction = self
            .with_retry("submit", || self.provider.submit(&full_prompt))
            .await
            .map_err(|e| {
                advance(job, JobStatus::Failed);
                e
            })?;
        job.job_id = Some(prediction.id.clone());

        tracing::info!(
            user_id = %job.user_id,
            job_id = %prediction.id,
            "Generation submitted"
        );

        if !prediction.status.is_terminal() {
            advance(job, JobStatus::Polling);
        }

        loop {
            if prediction.status.is_terminal() {
                return Self::finish(job, prediction);
            }

            tokio::time::sleep(self.config.poll_interval).await;

            let id = prediction.id.clone();
            prediction = self
                .with_retry("poll", || self.provider.get(&id))
                .await
                .map_err(|e| {
                    advance(job, JobStatus::Failed);
                    e
                })?;
            tracing::debug!(job_id = %prediction.id, status = ?prediction.status, "Polled generation");
        }
    }

    fn finish(job: &mut GenerationJob, prediction: Prediction) -> Result<String, GenerationError> {
        match prediction.status {
            PredictionStatus::Succeeded => {
                if let Some(url) = prediction.output.into_iter().next() {
                    advance(job, JobStatus::Succeeded);
                    Ok(url)
                } else {
                    advance(job, JobStatus::Failed);
                    Err(GenerationError::ProviderFailed(
                        "provider returned no output".into(),
                    ))
                }
            }
            status => {
                advance(job, JobStatus::Failed);
                Err(GenerationError::ProviderFailed(
                    prediction
                        .error
                        .unwrap_or_else(|| format!("prediction {status:?}").to_lowercase()),
                ))
            }
        }
    }

    /// Run a provider call, retrying once on a transient fault.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let failed = |e: ProviderError| GenerationError::ProviderFailed(format!("{op}: {e}"));
        match call().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(op, error = %e, "Provider call failed, retrying once");
                call().await.map_err(failed)
            }
            Err(e) => Err(failed(e)),
        }
    }

    fn refund(&self, token: &ReservationToken) {
        if let Err(e) = self.ledger.refund(token) {
            tracing::error!(
                user_id = %token.user_id,
                reservation_id = %token.id,
                error = %e,
                "Refund failed"
            );
        }
    }

    /// Persist a successful generation. Failures here do not refund.
    async fn record(&self, job: &GenerationJob, output_url: String) -> Result<EmojiArtifact, GenerationError> {
        let storage = |what: &str, e: &dyn std::fmt::Display| {
            tracing::error!(user_id = %job.user_id, error = %e, "{what} failed after generation");
            GenerationError::Storage(format!("{what}: {e}"))
        };

        let image_url = if self.config.mirror_outputs {
            let bytes = self
                .provider
                .download(&output_url)
                .await
                .map_err(|e| storage("download", &e))?;
            let path = ObjectPath::for_artifact(&job.user_id, job.created_at, &job.prompt);
            self.blobs
                .put(&path, bytes, IMAGE_CONTENT_TYPE)
                .await
                .map_err(|e| storage("upload", &e))?
                .into_string()
        } else {
            output_url
        };

        let artifact = self
            .store
            .insert_artifact(NewArtifact {
                image_url: image_url.clone(),
                prompt: job.prompt.clone(),
                creator_id: job.user_id.clone(),
            })
            .map_err(|e| {
                tracing::warn!(image_url = %image_url, "Blob stored without an artifact row");
                storage("insert", &e)
            })?;

        tracing::info!(
            user_id = %job.user_id,
            artifact_id = %artifact.id,
            finished_in_ms = (Utc::now() - job.created_at).num_milliseconds(),
            "Generation recorded"
        );
        Ok(artifact)
    }
}
