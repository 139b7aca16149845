//! HTTP client tests against a mock server.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emoji_client::{ClientError, EmojiClient};
use emoji_core::{ArtifactId, EmojiArtifact, NewArtifact, UserId};

fn signed_in(mock: &MockServer) -> EmojiClient {
    EmojiClient::new(mock.uri())
        .unwrap()
        .with_access_token("jwt-123")
}

fn artifact() -> EmojiArtifact {
    EmojiArtifact::from_new(NewArtifact {
        image_url: "https://cdn.test/cat.png".into(),
        prompt: "cat".into(),
        creator_id: UserId::generate(),
    })
}

#[tokio::test]
async fn generate_returns_artifact() {
    let mock = MockServer::start().await;
    let cat = artifact();
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(header("authorization", "Bearer jwt-123"))
        .and(body_json(json!({ "prompt": "cat" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": cat.image_url,
            "artifact": cat
        })))
        .mount(&mock)
        .await;

    let generated = signed_in(&mock).generate("cat").await.unwrap();

    assert_eq!(generated.url, "https://cdn.test/cat.png");
    assert_eq!(generated.artifact, cat);
}

#[tokio::test]
async fn insufficient_credits_soft_error_is_typed() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "Insufficient credits",
            "message": "You need at least 1 credit to generate an emoji.",
            "balance": 0
        })))
        .mount(&mock)
        .await;

    let err = signed_in(&mock).generate("cat").await.unwrap_err();

    assert!(matches!(err, ClientError::InsufficientCredits { balance: 0 }));
}

#[tokio::test]
async fn generation_failure_carries_code() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Failed to generate emoji",
            "code": "provider_timeout"
        })))
        .mount(&mock)
        .await;

    let err = signed_in(&mock).generate("cat").await.unwrap_err();

    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "provider_timeout");
            assert_eq!(status, 500);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_and_not_found_are_typed() {
    let mock = MockServer::start().await;
    let missing = ArtifactId::generate();
    Mock::given(method("GET"))
        .and(path("/v1/credits/balance"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "Unauthorized",
            "code": "unauthorized"
        })))
        .mount(&mock)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/v1/feed/{missing}/like")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": format!("artifact not found: {missing}"),
            "code": "not_found"
        })))
        .mount(&mock)
        .await;
    let client = signed_in(&mock);

    assert!(matches!(
        client.get_balance().await,
        Err(ClientError::Unauthorized)
    ));
    assert!(matches!(
        client.like(&missing).await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn anonymous_feed_request_has_no_auth_header() {
    let mock = MockServer::start().await;
    let cat = artifact();
    Mock::given(method("GET"))
        .and(path("/v1/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [cat],
            "liked_ids": [],
            "as_of": Utc::now()
        })))
        .mount(&mock)
        .await;

    let page = EmojiClient::new(mock.uri()).unwrap().feed().await.unwrap();

    assert_eq!(page.artifacts, vec![cat]);
    let requests = mock.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}
