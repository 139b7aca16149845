//! Common test utilities for emoji service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emoji_core::UserId;
use emoji_service::{create_router, AppState, InferenceProvider, ReplicateClient, ServiceConfig};
use emoji_store::{BlobStore, LocalBlobStore, MemoryStore, Store};

/// Public base URL the harness stores blobs under.
pub const PUBLIC_BASE_URL: &str = "http://localhost/blobs";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The in-memory store behind the server.
    pub store: Arc<MemoryStore>,
    /// Temporary directory for blobs (kept alive for test duration).
    pub _blob_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a harness with no inference provider configured.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a harness whose provider is a Replicate client pointed at `api_url`.
    pub fn with_replicate(api_url: &str) -> Self {
        let client = ReplicateClient::new(api_url, "r8_test_token", "test-version")
            .expect("Failed to build Replicate client");
        Self::build(Some(Arc::new(client)))
    }

    fn build(provider: Option<Arc<dyn InferenceProvider>>) -> Self {
        let blob_dir = TempDir::new().expect("Failed to create temp directory");
        let config = test_config(&blob_dir);

        let store = Arc::new(MemoryStore::new());
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(blob_dir.path(), PUBLIC_BASE_URL));

        let state = AppState::with_provider(store.clone() as Arc<dyn Store>, blobs, provider, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _blob_dir: blob_dir,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        let other_user = UserId::generate();
        format!("Bearer test-token:{other_user}")
    }

    /// Get an admin's auth header.
    pub fn admin_auth_header() -> String {
        let admin = UserId::generate();
        format!("Bearer test-admin:{admin}")
    }

    /// Create the test user's profile.
    pub async fn sign_in(&self) {
        self.server
            .post("/v1/profile")
            .add_header("authorization", self.user_auth_header())
            .await
            .assert_status_ok();
    }

    /// Seed a feed entry directly through the store.
    pub fn seed_artifact(&self, prompt: &str) -> emoji_core::EmojiArtifact {
        self.store
            .insert_artifact(emoji_core::NewArtifact {
                image_url: format!("{PUBLIC_BASE_URL}/seed/{prompt}.png"),
                prompt: prompt.to_string(),
                creator_id: UserId::generate(),
            })
            .expect("Failed to seed artifact")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Service configuration for tests: fast polling, blobs under `blob_dir`.
pub fn test_config(blob_dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        data_dir: blob_dir.path().to_string_lossy().to_string(),
        auth_base_url: "http://localhost".into(),
        auth_audience: "emoji".into(),
        poll_interval: Duration::from_millis(10),
        poll_timeout: Duration::from_secs(2),
        blob_dir: blob_dir.path().to_string_lossy().to_string(),
        public_base_url: PUBLIC_BASE_URL.into(),
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        ..ServiceConfig::default()
    }
}

/// Mock a Replicate prediction that succeeds after one poll, with its output
/// image served by the same mock server.
pub async fn mock_successful_prediction(mock: &MockServer, prediction_id: &str) {
    let output_url = format!("{}/outputs/{prediction_id}.png", mock.uri());

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": prediction_id,
            "status": "starting",
            "output": null,
            "error": null
        })))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/predictions/{prediction_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": prediction_id,
            "status": "succeeded",
            "output": [output_url],
            "error": null
        })))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/outputs/{prediction_id}.png")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a])
                .insert_header("content-type", "image/png"),
        )
        .mount(mock)
        .await;
}
