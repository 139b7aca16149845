//! Replicate client tests against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emoji_core::JobId;
use emoji_service::{InferenceProvider, PredictionStatus, ProviderError, ReplicateClient};

fn client(mock: &MockServer) -> ReplicateClient {
    ReplicateClient::new(format!("{}/", mock.uri()), "r8_secret", "abc123").unwrap()
}

#[tokio::test]
async fn submit_parses_starting_prediction() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(header("authorization", "Token r8_secret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred_123",
            "status": "starting",
            "output": null,
            "error": null,
            "urls": { "get": "ignored" }
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let prediction = client(&mock).submit("Generate a TOK emoji of a cat").await.unwrap();

    assert_eq!(prediction.id, JobId::new("pred_123"));
    assert_eq!(prediction.status, PredictionStatus::Starting);
    assert!(prediction.output.is_empty());
}

#[tokio::test]
async fn get_accepts_single_output_url() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/predictions/pred_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pred_1",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.png"
        })))
        .mount(&mock)
        .await;

    let prediction = client(&mock).get(&JobId::new("pred_1")).await.unwrap();

    assert_eq!(prediction.status, PredictionStatus::Succeeded);
    assert_eq!(prediction.output, vec!["https://replicate.delivery/out.png"]);
}

#[tokio::test]
async fn api_error_carries_detail() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "title": "Invalid version",
            "detail": "The specified version does not exist"
        })))
        .mount(&mock)
        .await;

    let err = client(&mock).submit("x").await.unwrap_err();

    match &err {
        ProviderError::Api { status, message } => {
            assert_eq!(*status, 422);
            assert_eq!(message, "The specified version does not exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_transient());
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/predictions/pred_1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock)
        .await;

    let err = client(&mock).get(&JobId::new("pred_1")).await.unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn download_returns_bytes_and_rejects_missing_files() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7, 8, 9]))
        .mount(&mock)
        .await;
    let client = client(&mock);

    let bytes = client.download(&format!("{}/out.png", mock.uri())).await.unwrap();
    assert_eq!(bytes, vec![7, 8, 9]);

    let err = client
        .download(&format!("{}/missing.png", mock.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Api { status: 404, .. }));
}
