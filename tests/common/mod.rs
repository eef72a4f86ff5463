//! Common test utilities for the relay
//!
//! Shared configuration, server construction, a scripted in-process provider
//! and helpers for reading event streams.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};

use chat_relay::{
    envelope::ChatMessage,
    error::UpstreamError,
    proxy::{ChatProvider, CompletionResult, DeltaStream},
    routes::create_router,
    AppState, Config,
};

/// Test configuration constants
pub mod constants {
    /// The relay's static bearer token
    pub const TEST_API_KEY: &str = "sk-relay-test";
    /// Upstream credential expected by the mock
    pub const TEST_AZURE_KEY: &str = "test-azure-key";
    pub const TEST_DEPLOYMENT: &str = "gpt-4o";
    pub const TEST_API_VERSION: &str = "2024-02-01";
    pub const CHAT_PATH: &str = "/v1/chat/completions";
    pub const DONE_FRAME: &str = "data: [DONE]\n\n";
}

/// Relay configuration pointing at `upstream_url`
pub fn test_config(upstream_url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: constants::TEST_API_KEY.to_string(),
        azure_endpoint: upstream_url.to_string(),
        azure_api_key: constants::TEST_AZURE_KEY.to_string(),
        azure_api_version: constants::TEST_API_VERSION.to_string(),
        azure_deployment: constants::TEST_DEPLOYMENT.to_string(),
        sub_chunk_size: 2,
        upstream_timeout_seconds: 5,
    }
}

/// Server backed by the real Azure provider talking to `upstream_url`
pub fn server_for_upstream(upstream_url: &str) -> TestServer {
    let state = AppState::new(test_config(upstream_url)).expect("Failed to build app state");
    TestServer::new(create_router(Arc::new(state))).expect("Failed to create test server")
}

/// Server backed by an in-process provider
pub fn server_with_provider(provider: impl ChatProvider + 'static) -> TestServer {
    // Nothing listens on this port; the scripted provider never dials it
    let config = test_config("http://127.0.0.1:9");
    let state = AppState::with_provider(config, Arc::new(provider));
    TestServer::new(create_router(Arc::new(state))).expect("Failed to create test server")
}

pub fn bearer(token: &str) -> HeaderValue {
    format!("Bearer {}", token).parse().unwrap()
}

/// Add the valid credential to a request
pub fn authorized(request: TestRequest) -> TestRequest {
    request.add_header(header::AUTHORIZATION, bearer(constants::TEST_API_KEY))
}

pub fn chat_body(stream: bool) -> Value {
    json!({
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello!"}
        ],
        "stream": stream
    })
}

/// Split an event-stream body into its `data:` payloads
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            frame
                .strip_prefix("data: ")
                .unwrap_or_else(|| panic!("frame without data prefix: {frame:?}"))
                .to_string()
        })
        .collect()
}

/// Delta contents of every frame but the sentinel, which must be last
pub fn stream_contents(body: &str) -> Vec<String> {
    assert!(body.ends_with(constants::DONE_FRAME), "stream must end with [DONE]: {body:?}");
    assert_eq!(body.matches(constants::DONE_FRAME).count(), 1, "exactly one [DONE]");

    let payloads = sse_payloads(body);
    let (last, frames) = payloads.split_last().expect("at least the sentinel");
    assert_eq!(last, "[DONE]");

    frames
        .iter()
        .map(|payload| {
            let value: Value = serde_json::from_str(payload).expect("frame payload is JSON");
            value["choices"][0]["delta"]["content"]
                .as_str()
                .expect("delta content is a string")
                .to_string()
        })
        .collect()
}

/// Provider replaying a fixed script
pub struct ScriptedProvider {
    /// Returned instead of any output when set
    pub connect_error: Option<UpstreamError>,
    /// Items of the streaming call
    pub stream_items: Vec<Result<String, UpstreamError>>,
    /// Result of the non-streaming call
    pub completion: Result<CompletionResult, UpstreamError>,
}

impl ScriptedProvider {
    pub fn streaming(items: Vec<Result<&str, UpstreamError>>) -> Self {
        Self {
            connect_error: None,
            stream_items: items.into_iter().map(|item| item.map(str::to_string)).collect(),
            completion: Ok(CompletionResult::Empty),
        }
    }

    pub fn completing(completion: Result<CompletionResult, UpstreamError>) -> Self {
        Self {
            connect_error: None,
            stream_items: Vec::new(),
            completion,
        }
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self {
            connect_error: Some(err),
            stream_items: Vec::new(),
            completion: Ok(CompletionResult::Empty),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat_completion(&self, _messages: &[ChatMessage]) -> Result<CompletionResult, UpstreamError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        self.completion.clone()
    }

    async fn chat_completion_stream(&self, _messages: &[ChatMessage]) -> Result<DeltaStream, UpstreamError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        Ok(Box::pin(futures::stream::iter(self.stream_items.clone())))
    }
}
