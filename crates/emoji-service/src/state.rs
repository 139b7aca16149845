//! Application state.

use std::sync::Arc;

use emoji_store::{BlobStore, Store};

use crate::config::ServiceConfig;
use crate::ledger::CreditLedger;
use crate::orchestrator::{GenerationConfig, JobOrchestrator};
use crate::provider::InferenceProvider;
use crate::replicate::ReplicateClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Blob storage for artifact images.
    pub blobs: Arc<dyn BlobStore>,

    /// Credit ledger.
    pub ledger: Arc<CreditLedger>,

    /// Generation orchestrator (absent when no provider is configured).
    pub orchestrator: Option<Arc<JobOrchestrator>>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create application state, building the Replicate provider if a token is configured.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, config: ServiceConfig) -> Self {
        let provider = config.replicate_api_token.as_ref().and_then(|token| {
            match ReplicateClient::new(&config.replicate_api_url, token, &config.model_version) {
                Ok(client) => {
                    tracing::info!(api_url = %config.replicate_api_url, "Replicate integration enabled");
                    Some(Arc::new(client) as Arc<dyn InferenceProvider>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Replicate client");
                    None
                }
            }
        });

        if provider.is_none() {
            tracing::warn!("Replicate not configured - generation will not be available");
        }

        Self::with_provider(store, blobs, provider, config)
    }

    /// Create application state around an explicit provider.
    #[must_use]
    pub fn with_provider(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        provider: Option<Arc<dyn InferenceProvider>>,
        config: ServiceConfig,
    ) -> Self {
        let ledger = Arc::new(CreditLedger::new(store.clone(), config.starting_credits));
        let orchestrator = provider.map(|provider| {
            Arc::new(JobOrchestrator::new(
                ledger.clone(),
                provider,
                store.clone(),
                blobs.clone(),
                GenerationConfig::from(&config),
            ))
        });

        Self {
            store,
            blobs,
            ledger,
            orchestrator,
            config,
        }
    }

    /// Check if generation is available.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.orchestrator.is_some()
    }
}
