//! Azure OpenAI upstream
//!
//! Sends chat completions to a single deployment. Temperature is pinned to 0
//! and no request is ever retried.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use super::provider::{ChatProvider, CompletionResult, DeltaStream};
use crate::{
    config::Config,
    envelope::ChatMessage,
    error::UpstreamError,
    streaming::{parse_event_line, sse::UpstreamErrorBody, SseLineBuffer, UpstreamEvent},
};

/// Request body sent upstream
#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct UpstreamCompletion {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChoice {
    message: UpstreamMessage,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorResponse {
    error: UpstreamErrorBody,
}

/// Azure OpenAI client for one deployment
pub struct AzureOpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
}

impl AzureOpenAIProvider {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: config.azure_endpoint.trim_end_matches('/').to_string(),
            api_key: config.azure_api_key.clone(),
            api_version: config.azure_api_version.clone(),
            deployment: config.azure_deployment.clone(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    fn default_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|e| UpstreamError::Unknown {
            message: format!("Invalid upstream api-key header: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert("api-key", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Single attempt; non-2xx statuses become errors
    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, UpstreamError> {
        let body = UpstreamRequest {
            messages,
            temperature: 0.0,
            stream,
        };

        let response = self
            .client
            .post(self.url())
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(deployment = %self.deployment, error = %e, "Failed to send request upstream");
                UpstreamError::from(e)
            })?;

        let status = response.status();
        debug!(deployment = %self.deployment, status = %status, stream, "Received upstream response");

        if !status.is_success() {
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!(status = %status, error = %e, "Failed to read upstream error body");
                    String::new()
                }
            };
            let err = status_error(status.as_u16(), &text);
            warn!(
                kind = err.kind(),
                status = status.as_u16(),
                error = %err,
                "Upstream rejected chat completion"
            );
            return Err(err);
        }

        Ok(response)
    }
}

/// Map a non-2xx upstream response onto the failure taxonomy
pub(crate) fn status_error(status: u16, body: &str) -> UpstreamError {
    let reported = serde_json::from_str::<UpstreamErrorResponse>(body)
        .ok()
        .map(|response| response.error.describe());

    match (status, reported) {
        (429, Some(message)) => UpstreamError::RateLimited { message },
        (429, None) => UpstreamError::RateLimited {
            message: non_empty_or(body, "Too Many Requests"),
        },
        (_, Some(message)) => UpstreamError::Api { message },
        (status, None) => UpstreamError::Transport {
            status,
            message: non_empty_or(body, "upstream returned an error status"),
        },
    }
}

fn non_empty_or(body: &str, fallback: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        fallback.to_string()
    } else {
        body.to_string()
    }
}

/// Adapt the raw SSE byte stream into content deltas
fn delta_stream(response: reqwest::Response) -> DeltaStream {
    let bytes = response.bytes_stream();

    Box::pin(async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut buffer = SseLineBuffer::new();
        let mut terminated = false;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    terminated = true;
                    yield Err(UpstreamError::from(e));
                    break 'read;
                }
            };

            for line in buffer.feed(&chunk) {
                match parse_event_line(&line) {
                    Ok(UpstreamEvent::Delta(Some(text))) => {
                        yield Ok(text);
                    }
                    Ok(UpstreamEvent::Delta(None)) | Ok(UpstreamEvent::Ignored) => {}
                    Ok(UpstreamEvent::Done) => {
                        terminated = true;
                        break 'read;
                    }
                    Err(err) => {
                        terminated = true;
                        yield Err(err);
                        break 'read;
                    }
                }
            }
        }

        // Trailing event without a final newline
        if let Some(line) = buffer.finish().filter(|_| !terminated) {
            match parse_event_line(&line) {
                Ok(UpstreamEvent::Delta(Some(text))) => {
                    yield Ok(text);
                }
                Ok(_) => {}
                Err(err) => {
                    yield Err(err);
                }
            }
        }
    })
}

#[async_trait]
impl ChatProvider for AzureOpenAIProvider {
    fn name(&self) -> &'static str {
        "azure-openai"
    }

    #[instrument(skip_all, fields(deployment = %self.deployment, messages = messages.len()))]
    async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<CompletionResult, UpstreamError> {
        let response = self.send(messages, false).await?;
        let completion: UpstreamCompletion = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to decode upstream completion");
            UpstreamError::Unknown {
                message: format!("Failed to decode upstream completion: {}", e),
            }
        })?;

        Ok(match completion.choices.into_iter().next() {
            Some(choice) => CompletionResult::Content(choice.message.content.unwrap_or_default()),
            None => CompletionResult::Empty,
        })
    }

    #[instrument(skip_all, fields(deployment = %self.deployment, messages = messages.len()))]
    async fn chat_completion_stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, UpstreamError> {
        let response = self.send(messages, true).await?;
        Ok(delta_stream(response))
    }
}
