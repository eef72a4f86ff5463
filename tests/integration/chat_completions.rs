//! Chat completions endpoint integration tests (non-streaming)
//!
//! - Credential rejections rendered as envelopes
//! - Content, empty and error outcomes from the upstream
//! - Status is 200 in every case

use axum::http::{header, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use chat_relay::{error::UpstreamError, proxy::CompletionResult};

use crate::common::{
    authorized, bearer, chat_body, constants::CHAT_PATH, server_for_upstream, server_with_provider,
    ScriptedProvider,
};
use crate::mocks::{rate_limit_body, MockAzureOpenAI};

fn assert_single_choice(json: &Value, finish_reason: &str) -> String {
    let choices = json["choices"].as_array().expect("choices array");
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0]["finish_reason"], finish_reason);
    choices[0]["message"]["content"]
        .as_str()
        .expect("content string")
        .to_string()
}

#[tokio::test]
async fn test_missing_authorization_header() {
    let upstream = MockAzureOpenAI::start().await;
    let server = server_for_upstream(&upstream.uri());

    let response = server.post(CHAT_PATH).json(&chat_body(false)).await;

    response.assert_status_ok();
    assert_eq!(
        response.text(),
        r#"{"choices":[{"message":{"content":"缺少 Authorization 请求头"},"finish_reason":"error"}]}"#
    );
    assert!(upstream.received_bodies().await.is_empty());
}

#[tokio::test]
async fn test_wrong_scheme_and_shape() {
    let upstream = MockAzureOpenAI::start().await;
    let server = server_for_upstream(&upstream.uri());

    let response = server
        .post(CHAT_PATH)
        .add_header(header::AUTHORIZATION, "Basic sk-relay-test".parse().unwrap())
        .json(&chat_body(false))
        .await;
    response.assert_status_ok();
    assert_eq!(
        assert_single_choice(&response.json(), "error"),
        "Authorization 请求头格式不正确, 需要使用 Bearer 认证"
    );

    let response = server
        .post(CHAT_PATH)
        .add_header(header::AUTHORIZATION, "sk-relay-test".parse().unwrap())
        .json(&chat_body(false))
        .await;
    response.assert_status_ok();
    assert_eq!(
        assert_single_choice(&response.json(), "error"),
        "Authorization 请求头格式不正确"
    );
}

#[tokio::test]
async fn test_invalid_key() {
    let upstream = MockAzureOpenAI::start().await;
    let server = server_for_upstream(&upstream.uri());

    let response = server
        .post(CHAT_PATH)
        .add_header(header::AUTHORIZATION, bearer("wrongtoken"))
        .json(&chat_body(false))
        .await;

    response.assert_status_ok();
    assert_eq!(assert_single_choice(&response.json(), "error"), "API 密钥无效");
    assert!(upstream.received_bodies().await.is_empty());
}

#[tokio::test]
async fn test_non_ascii_token_is_invalid_key() {
    let upstream = MockAzureOpenAI::start().await;
    let server = server_for_upstream(&upstream.uri());

    let response = server
        .post(CHAT_PATH)
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_bytes("Bearer 密钥".as_bytes()).unwrap(),
        )
        .json(&chat_body(false))
        .await;

    response.assert_status_ok();
    assert_eq!(assert_single_choice(&response.json(), "error"), "API 密钥无效");
}

#[tokio::test]
async fn test_completion_content() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_completion("hello").await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({"choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}]})
    );
}

#[tokio::test]
async fn test_upstream_receives_messages_in_order() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_completion("ok").await;
    let server = server_for_upstream(&upstream.uri());

    authorized(server.post(CHAT_PATH))
        .json(&chat_body(false))
        .await
        .assert_status_ok();

    let bodies = upstream.received_bodies().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0]["messages"],
        json!([
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello!"}
        ])
    );
    assert_eq!(bodies[0]["temperature"], 0.0);
    assert_eq!(bodies[0]["stream"], false);
}

#[tokio::test]
async fn test_stream_flag_defaults_to_false() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_completion("plain").await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH))
        .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
        .await;

    response.assert_status_ok();
    assert_eq!(assert_single_choice(&response.json(), "stop"), "plain");
}

#[tokio::test]
async fn test_empty_choices() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_empty_completion().await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    assert_eq!(response.text(), r#"{"choices":[]}"#);
}

#[tokio::test]
async fn test_null_content_becomes_empty_string() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_null_content_completion().await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    assert_eq!(assert_single_choice(&response.json(), "stop"), "");
}

#[tokio::test]
async fn test_rate_limit_is_enveloped() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_error(429, rate_limit_body()).await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    let content = assert_single_choice(&response.json(), "error");
    assert!(content.starts_with("Error code: 429 - "), "{content}");

    let inner: Value = serde_json::from_str(content.strip_prefix("Error code: 429 - ").unwrap()).unwrap();
    assert_eq!(inner["error"]["code"], "429");
    assert!(inner["error"]["message"]
        .as_str()
        .unwrap()
        .contains("exceeded call rate limit"));

    // A single attempt, no retries
    assert_eq!(upstream.received_bodies().await.len(), 1);
}

#[tokio::test]
async fn test_upstream_api_error_is_enveloped() {
    let upstream = MockAzureOpenAI::start().await;
    upstream
        .mock_error(400, json!({"error": {"code": "content_filter", "message": "filtered"}}))
        .await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    assert_eq!(
        assert_single_choice(&response.json(), "error"),
        r#"Error code: 500 - {"error":{"code":"500","message":"upstream API error: filtered"}}"#
    );
}

#[tokio::test]
async fn test_transport_error_keeps_status() {
    let upstream = MockAzureOpenAI::start().await;
    upstream.mock_error_text(503, "Service Unavailable").await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    let content = assert_single_choice(&response.json(), "error");
    assert!(content.starts_with("Error code: 503 - "), "{content}");
}

#[tokio::test]
async fn test_unreachable_upstream_is_enveloped() {
    // Nothing listens on the discard port
    let server = server_for_upstream("http://127.0.0.1:9");

    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;

    response.assert_status_ok();
    let content = assert_single_choice(&response.json(), "error");
    assert!(content.starts_with("Error code: 500 - "), "{content}");
}

#[tokio::test]
async fn test_invalid_body_is_enveloped() {
    let upstream = MockAzureOpenAI::start().await;
    let server = server_for_upstream(&upstream.uri());

    let response = authorized(server.post(CHAT_PATH))
        .json(&json!({"messages": [{"role": "user"}]}))
        .await;

    response.assert_status(StatusCode::OK);
    let content = assert_single_choice(&response.json(), "error");
    assert!(content.contains("Invalid request body"), "{content}");
}

#[tokio::test]
async fn test_scripted_outcomes_are_stable() {
    let server = server_with_provider(ScriptedProvider::completing(Err(UpstreamError::Unknown {
        message: "socket closed".into(),
    })));

    let first = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await.text();
    let second = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await.text();
    assert_eq!(first, second);

    let server = server_with_provider(ScriptedProvider::completing(Ok(CompletionResult::Content(
        "scripted".into(),
    ))));
    let response = authorized(server.post(CHAT_PATH)).json(&chat_body(false)).await;
    assert_eq!(assert_single_choice(&response.json(), "stop"), "scripted");
}
