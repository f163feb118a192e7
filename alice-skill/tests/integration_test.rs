//! Integration tests for the Alice skill.
//!
//! Drives the webhook end to end against a mocked Responses API.

use alice_common::config::Config;
use alice_skill::{build_app, OpenAiOracle};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test config with short timings so deferred answers settle quickly.
fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.dialog.answer_timeout_ms = 300;
    config.dialog.platform_deadline_ms = 2_000;
    config.oracle.endpoint = server.uri();
    config.oracle.api_key = Some("test-key".into());
    config.oracle.timeout_secs = 5;
    config
}

fn create_test_app(config: &Config) -> axum::Router {
    let oracle = OpenAiOracle::new(&config.oracle).unwrap();
    let (router, _store) = build_app(config, Arc::new(oracle)).unwrap();
    router
}

fn turn(session_id: &str, utterance: &str) -> Value {
    json!({
        "meta": { "locale": "ru-RU", "timezone": "Europe/Moscow" },
        "session": { "session_id": session_id, "message_id": 1, "new": false },
        "version": "1.0",
        "request": {
            "original_utterance": utterance,
            "type": "SimpleUtterance"
        }
    })
}

/// Helper to make a JSON request.
async fn request_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = if let Some(b) = body {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap()
    } else {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, json)
}

async fn send_turn(app: &axum::Router, session_id: &str, utterance: &str) -> Value {
    let (status, json) = request_json(app, Method::POST, "/", Some(turn(session_id, utterance))).await;
    assert_eq!(status, StatusCode::OK);
    json
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_ready() {
    let server = MockServer::start().await;
    let app = create_test_app(&test_config(&server));

    let (status, json) = request_json(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");

    let (status, json) = request_json(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessions"], 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialog Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_utterance_prompts() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let app = create_test_app(&config);

    let json = send_turn(&app, "s1", "").await;
    assert_eq!(json["session"], "s1");
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["response"]["text"], config.dialog.prompt_text);
    assert_eq!(json["response"]["end_session"], false);

    let (_, ready) = request_json(&app, Method::GET, "/ready", None).await;
    assert_eq!(ready["sessions"], 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fast_answer_with_wake_word() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({ "input": "сколько будет два плюс два?" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_1",
            "output_text": "Четыре"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = create_test_app(&test_config(&server));
    let json = send_turn(&app, "s1", "Алиса, сколько будет два плюс два?").await;

    assert_eq!(json["response"]["text"], "Четыре");
    assert!(json["response"].get("tts").is_none());
}

#[tokio::test]
async fn test_continuation_token_flows_between_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "previous_response_id": "resp_1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_2",
            "output_text": "Восемь"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_1",
            "output_text": "Четыре"
        })))
        .mount(&server)
        .await;

    let app = create_test_app(&test_config(&server));
    assert_eq!(send_turn(&app, "s1", "два плюс два").await["response"]["text"], "Четыре");
    assert_eq!(send_turn(&app, "s1", "а умножить?").await["response"]["text"], "Восемь");
}

#[tokio::test]
async fn test_slow_answer_is_delivered_on_next_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "resp_1", "output_text": "Четыре" }))
                .set_delay(Duration::from_millis(600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let app = create_test_app(&config);

    let json = send_turn(&app, "s1", "сколько будет два плюс два?").await;
    assert!(json["response"].get("text").is_none());
    assert_eq!(json["response"]["tts"], config.dialog.thinking_text);
    assert_eq!(json["response"]["end_session"], false);

    let json = send_turn(&app, "s1", "").await;
    assert_eq!(json["response"]["tts"], config.dialog.not_ready_text);

    tokio::time::sleep(Duration::from_millis(800)).await;

    let json = send_turn(&app, "s1", "").await;
    assert_eq!(json["response"]["text"], "Четыре");

    let json = send_turn(&app, "s1", "").await;
    assert_eq!(json["response"]["text"], config.dialog.prompt_text);
}

#[tokio::test]
async fn test_backend_failure_is_spoken_and_session_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "The server had an error" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let app = create_test_app(&config);

    let json = send_turn(&app, "s1", "привет").await;
    let text = json["response"]["text"].as_str().unwrap();
    assert!(text.starts_with(&config.dialog.failure_prefix));
    assert!(text.contains("The server had an error"));

    // The failed call left nothing in flight, so this is a new question.
    let json = send_turn(&app, "s1", "привет ещё раз").await;
    assert!(json["response"]["text"]
        .as_str()
        .unwrap()
        .starts_with(&config.dialog.failure_prefix));
}

#[tokio::test]
async fn test_bad_request_is_rejected() {
    let server = MockServer::start().await;
    let app = create_test_app(&test_config(&server));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
