//! Dialogue Service Contract Tests
//!
//! These tests verify the HTTP exchange with the dialogue service:
//! - Request body is `{ userId, message }` POSTed as JSON
//! - Replies with and without optional annotations parse
//! - Error statuses and malformed bodies map to `ChatError::Service`
//! - A session driven against the mock server records the right turns

#![allow(clippy::unwrap_used, clippy::expect_used)]

use kanha::config::ServiceConfig;
use kanha::{
    ChatConfig, ChatError, ChatRequest, DialogueService, Emotion, HttpDialogueService, ReplyKind,
    Role, SessionController, SubmitOutcome,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_config(server: &MockServer) -> ServiceConfig {
    ServiceConfig {
        endpoint: format!("{}/api/chat", server.uri()),
        user_id: "user1".to_owned(),
        timeout_secs: 5,
    }
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        user_id: "user1".to_owned(),
        message: message.to_owned(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_is_posted_as_camel_case_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "userId": "user1",
            "message": "I feel anxious"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "Breathe with me."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpDialogueService::new(&service_config(&server)).unwrap();
    let reply = service.chat(&request("I feel anxious")).await.unwrap();
    assert_eq!(reply.text, "Breathe with me.");
}

// ────────────────────────────────────────────────────────────────────────────
// Response parsing
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_reply_parses_all_annotations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "You are not alone. Please reach out to someone you trust.",
            "emotion": "crisis",
            "confidence": 1.0,
            "isCrisis": true
        })))
        .mount(&server)
        .await;

    let service = HttpDialogueService::new(&service_config(&server)).unwrap();
    let reply = service.chat(&request("I can't go on")).await.unwrap();
    assert_eq!(reply.emotion.as_deref(), Some("crisis"));
    assert_eq!(reply.confidence, Some(1.0));
    assert_eq!(reply.is_crisis, Some(true));
}

#[tokio::test]
async fn reply_without_annotations_parses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "Hello." })))
        .mount(&server)
        .await;

    let service = HttpDialogueService::new(&service_config(&server)).unwrap();
    let reply = service.chat(&request("hi")).await.unwrap();
    assert_eq!(reply.emotion, None);
    assert_eq!(reply.confidence, None);
    assert_eq!(reply.is_crisis, None);
}

// ────────────────────────────────────────────────────────────────────────────
// Error mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn server_error_maps_to_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let service = HttpDialogueService::new(&service_config(&server)).unwrap();
    match service.chat(&request("hello")).await {
        Err(ChatError::Service(message)) => {
            assert!(message.contains("500"), "message was {message}");
            assert!(message.contains("model crashed"), "message was {message}");
        }
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_maps_to_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let service = HttpDialogueService::new(&service_config(&server)).unwrap();
    assert!(matches!(
        service.chat(&request("hello")).await,
        Err(ChatError::Service(_))
    ));
}

#[tokio::test]
async fn unreachable_endpoint_maps_to_service_error() {
    let server = MockServer::start().await;
    let config = service_config(&server);
    drop(server);

    let service = HttpDialogueService::new(&config).unwrap();
    assert!(matches!(
        service.chat(&request("hello")).await,
        Err(ChatError::Service(_))
    ));
}

// ────────────────────────────────────────────────────────────────────────────
// Session against the mock service
// ────────────────────────────────────────────────────────────────────────────

fn session_for(server: &MockServer) -> SessionController {
    let mut config = ChatConfig::default();
    config.service = service_config(server);
    let service = HttpDialogueService::new(&config.service).unwrap();
    SessionController::new(Arc::new(service), &config)
}

#[tokio::test]
async fn session_records_annotated_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "Breathe with me.",
            "emotion": "fear",
            "confidence": 0.8
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert_eq!(
        session.submit("I feel anxious").await,
        SubmitOutcome::Completed(ReplyKind::Reply)
    );

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[1].role(), Role::Assistant);
    assert_eq!(messages[1].emotion(), Some(Emotion::Fear));
    assert_eq!(messages[1].confidence(), Some(0.8));
    assert!(!messages[1].is_crisis());
}

#[tokio::test]
async fn session_falls_back_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert_eq!(
        session.submit("hello").await,
        SubmitOutcome::Completed(ReplyKind::Fallback)
    );

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content(), "Server error. Please try again.");
    assert_eq!(messages[1].emotion(), None);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn blank_submission_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "unused" })))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.submit("   ").await;
    assert!(session.messages().is_empty());
}
