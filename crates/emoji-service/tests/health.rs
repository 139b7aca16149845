//! Health endpoint integration tests.

mod common;

use common::TestHarness;
use wiremock::MockServer;

#[tokio::test]
async fn health_check_returns_ok() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn health_check_returns_json() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "emoji");
    assert_eq!(body["generation_available"], false);
}

#[tokio::test]
async fn health_reports_generation_when_provider_configured() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_replicate(&mock.uri());

    let body: serde_json::Value = harness.server.get("/health").await.json();

    assert_eq!(body["generation_available"], true);
}
