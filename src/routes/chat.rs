//! Chat completions endpoint
//!
//! Validates the static credential, then relays the request upstream either as
//! an event stream or as a single JSON envelope. Every outcome, including
//! failures and panics inside the handler, is answered with HTTP 200 in the
//! shape the caller asked for.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{stream, FutureExt, Stream, StreamExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{authorization_header, token_fingerprint, validate_credentials},
    envelope::ChatRequest,
    error::{panic_message, AppError, AppResult, AuthFailure, UpstreamError},
    normalize::{auth_failure_envelope, normalize},
    proxy::{Completion, CompletionResult, DeltaStream},
    routes::metrics::{record_auth_failure, record_request},
    streaming::{catch_panics, event_stream, StreamFailure},
    AppState,
};

fn mode(stream: bool) -> &'static str {
    if stream {
        "stream"
    } else {
        "json"
    }
}

/// Handle chat completion requests
///
/// # Request Format
///
/// ```json
/// {
///   "messages": [{"role": "user", "content": "..."}],
///   "stream": false
/// }
/// ```
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> Response {
    let outcome = AssertUnwindSafe(handle(state, headers, request))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => err.into_response(),
        Err(panic) => AppError::Internal(anyhow!(
            "chat completion handler panicked: {}",
            panic_message(&*panic)
        ))
        .into_response(),
    }
}

async fn handle(
    state: Arc<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> AppResult<Response> {
    let start_time = Instant::now();

    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::Internal(anyhow!("Failed to read request body: {}", e)))?;

    let chat_request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        record_request("json", "invalid", start_time.elapsed().as_secs_f64());
        AppError::BadRequest(e.to_string())
    })?;

    let auth_header = authorization_header(&headers);
    if let Err(failure) = validate_credentials(auth_header.as_deref(), &state.config.api_key) {
        return reject(&state, chat_request.stream, failure, auth_header.as_deref(), start_time);
    }

    info!(
        stream = chat_request.stream,
        messages = chat_request.messages.len(),
        provider = state.provider.name(),
        "Processing chat completion request"
    );

    if chat_request.stream {
        handle_streaming(state, chat_request, start_time).await
    } else {
        handle_non_streaming(state, chat_request, start_time).await
    }
}

/// Render a credential failure in the caller's requested shape
fn reject(
    state: &AppState,
    stream: bool,
    failure: AuthFailure,
    auth_header: Option<&str>,
    start_time: Instant,
) -> AppResult<Response> {
    warn!(
        reason = failure.reason(),
        token_fingerprint = ?auth_header.map(token_fingerprint),
        stream,
        "Rejected credentials"
    );
    record_auth_failure(failure.reason());
    record_request(mode(stream), "rejected", start_time.elapsed().as_secs_f64());

    if stream {
        sse_response(event_stream(
            Err(StreamFailure::Preflight(failure)),
            state.config.sub_chunk_size,
        ))
    } else {
        Ok(auth_failure_envelope(failure).into_response())
    }
}

/// Handle non-streaming chat completion
async fn handle_non_streaming(
    state: Arc<AppState>,
    request: ChatRequest,
    start_time: Instant,
) -> AppResult<Response> {
    let outcome = match state.provider.complete(&request.messages, false).await {
        Ok(Completion::Finished(result)) => Ok(result),
        Ok(Completion::Stream(deltas)) => collect_deltas(deltas).await,
        Err(err) => Err(err),
    };

    let label = match &outcome {
        Ok(CompletionResult::Content(_)) => "success",
        Ok(CompletionResult::Empty) => "empty",
        Err(err) => {
            err.report("request");
            "upstream_error"
        }
    };

    let duration = start_time.elapsed().as_secs_f64();
    record_request("json", label, duration);
    info!(
        outcome = label,
        duration_ms = %format!("{:.2}", duration * 1000.0),
        "Chat completion request completed"
    );

    Ok(normalize(&outcome).into_response())
}

/// Join a delta stream when a provider streams for a non-streaming call
async fn collect_deltas(mut deltas: DeltaStream) -> Result<CompletionResult, UpstreamError> {
    let mut content = String::new();
    while let Some(delta) = deltas.next().await {
        content.push_str(&delta?);
    }
    Ok(CompletionResult::Content(content))
}

/// Handle streaming chat completion
async fn handle_streaming(
    state: Arc<AppState>,
    request: ChatRequest,
    start_time: Instant,
) -> AppResult<Response> {
    let source = match state.provider.complete(&request.messages, true).await {
        Ok(Completion::Stream(deltas)) => Ok(deltas),
        Ok(Completion::Finished(result)) => Ok(finished_as_stream(result)),
        Err(err) => {
            err.report("request");
            Err(StreamFailure::Upstream(err))
        }
    };

    let label = if source.is_ok() { "streaming" } else { "upstream_error" };
    record_request("stream", label, start_time.elapsed().as_secs_f64());

    let response = sse_response(event_stream(source, state.config.sub_chunk_size))?;
    info!(outcome = label, "Streaming chat started");
    Ok(response)
}

/// A finished completion replayed as a single delta
fn finished_as_stream(result: CompletionResult) -> DeltaStream {
    let content = match result {
        CompletionResult::Content(content) => Some(Ok(content)),
        CompletionResult::Empty => None,
    };
    Box::pin(stream::iter(content))
}

fn sse_response<S>(frames: S) -> AppResult<Response>
where
    S: Stream<Item = Result<bytes::Bytes, std::convert::Infallible>> + Send + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(catch_panics(frames)))
        .map_err(|e| AppError::Internal(anyhow!("Failed to build response: {}", e)))
}
