//! Integration tests for the HTTP broadcaster transport using wiremock.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docwatch_transport::{BroadcasterConfig, BroadcasterTransport, Error, Message, Transport};

fn update_message() -> Message {
    let mut data = BTreeMap::new();
    data.insert("payload".to_string(), r#"{"id":"abc123","title":"hello"}"#.to_string());
    Message::new("docs.abc123", "update", data)
}

fn transport(server: &MockServer) -> BroadcasterTransport {
    BroadcasterTransport::new(BroadcasterConfig::new(server.uri(), "shared-secret")).unwrap()
}

#[tokio::test]
async fn test_posts_dispatch_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .and(header("key", "shared-secret"))
        .and(body_json(json!({
            "event": "update",
            "room": "docs.abc123",
            "data": {
                "payload": r#"{"id":"abc123","title":"hello"}"#,
                "topic": "docs.abc123",
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let result = transport(&server).send_message(&update_message()).await;
    assert!(result.is_ok(), "dispatch should succeed: {:?}", result.err());
}

#[tokio::test]
async fn test_error_status_carries_error_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid key" })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_message(&update_message())
        .await
        .unwrap_err();

    match err {
        Error::Status { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_without_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream gone"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_message(&update_message())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Status { status: 502, ref message } if message == "upstream gone"
    ));
}

#[tokio::test]
async fn test_success_with_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_message(&update_message())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn test_non_ok_success_status_is_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_message(&update_message())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Status { status: 202, .. }));
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = BroadcasterConfig::new(server.uri(), "shared-secret")
        .with_timeout(Duration::from_millis(50));
    let transport = BroadcasterTransport::new(config).unwrap();

    let err = transport.send_message(&update_message()).await.unwrap_err();
    match err {
        Error::Http(e) => assert!(e.is_timeout()),
        other => panic!("expected timeout, got {:?}", other),
    }
}
