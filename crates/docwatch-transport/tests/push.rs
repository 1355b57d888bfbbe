//! Integration tests for the push transport using wiremock.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docwatch_transport::{
    Error, Message, PushTransport, ServiceAccountKey, ServiceAccountTokenSource, StaticToken,
    TokenSource, Transport,
};

const TEST_KEY: &str = include_str!("fixtures/test_rsa_key.pem");

fn delete_message() -> Message {
    let mut data = BTreeMap::new();
    data.insert("id".to_string(), "abc123".to_string());
    Message::new("docs.abc123", "delete", data)
}

fn service_account(token_uri: &str) -> ServiceAccountKey {
    let json = json!({
        "project_id": "demo-project",
        "client_email": "notifier@demo-project.iam.gserviceaccount.com",
        "private_key": TEST_KEY,
        "token_uri": token_uri,
    });
    ServiceAccountKey::from_json(json.to_string().as_bytes()).unwrap()
}

#[tokio::test]
async fn test_sends_topic_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/demo-project/messages:send"))
        .and(header("authorization", "Bearer static-token"))
        .and(body_json(json!({
            "message": {
                "topic": "docs.abc123",
                "data": { "id": "abc123" },
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "name": "projects/demo-project/messages/42" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = PushTransport::with_endpoint(
        &server.uri(),
        "demo-project",
        Arc::new(StaticToken::new("static-token")),
    )
    .unwrap();

    let result = transport.send_message(&delete_message()).await;
    assert!(result.is_ok(), "push should succeed: {:?}", result.err());
}

#[tokio::test]
async fn test_error_response_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/demo-project/messages:send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Invalid topic name",
                "status": "INVALID_ARGUMENT",
            }
        })))
        .mount(&server)
        .await;

    let transport = PushTransport::with_endpoint(
        &server.uri(),
        "demo-project",
        Arc::new(StaticToken::new("static-token")),
    )
    .unwrap();

    let err = transport.send_message(&delete_message()).await.unwrap_err();
    match err {
        Error::Status { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid topic name");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_service_account_token_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test-token",
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source =
        ServiceAccountTokenSource::new(service_account(&format!("{}/token", server.uri())))
            .unwrap();

    assert_eq!(source.access_token().await.unwrap(), "ya29.test-token");
    assert_eq!(source.access_token().await.unwrap(), "ya29.test-token");
}

#[tokio::test]
async fn test_service_account_token_refreshed_when_expiring() {
    let server = MockServer::start().await;

    // Tokens that expire inside the refresh margin are never reused.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short-lived",
            "expires_in": 30,
        })))
        .expect(2)
        .mount(&server)
        .await;

    let source =
        ServiceAccountTokenSource::new(service_account(&format!("{}/token", server.uri())))
            .unwrap();

    source.access_token().await.unwrap();
    source.access_token().await.unwrap();
}

#[tokio::test]
async fn test_oversized_token_lifetime_is_capped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "long-lived",
            "expires_in": u64::MAX,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source =
        ServiceAccountTokenSource::new(service_account(&format!("{}/token", server.uri())))
            .unwrap();

    assert_eq!(source.access_token().await.unwrap(), "long-lived");
    assert_eq!(source.access_token().await.unwrap(), "long-lived");
}

#[tokio::test]
async fn test_token_exchange_failure_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let source =
        ServiceAccountTokenSource::new(service_account(&format!("{}/token", server.uri())))
            .unwrap();

    let transport =
        PushTransport::with_endpoint(&server.uri(), "demo-project", Arc::new(source)).unwrap();

    let err = transport.send_message(&delete_message()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(ref msg) if msg.contains("invalid_grant")));
}
