//! Response normalization for the non-streaming path
//!
//! Every outcome (content, no choices, upstream failure, rejected credentials,
//! internal fault) becomes a [`ResponseEnvelope`] delivered with HTTP 200.
//! Failures are distinguishable only through `finish_reason`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    envelope::{FinishReason, ResponseEnvelope},
    error::{AuthFailure, UpstreamError},
    proxy::CompletionResult,
};

/// Wrap a finished completion
pub fn completion_envelope(result: &CompletionResult) -> ResponseEnvelope {
    match result {
        CompletionResult::Content(content) => ResponseEnvelope::single(content.clone(), FinishReason::Stop),
        CompletionResult::Empty => ResponseEnvelope::empty(),
    }
}

/// Wrap an error message as a single `finish_reason: "error"` choice
pub fn error_envelope(message: impl Into<String>) -> ResponseEnvelope {
    ResponseEnvelope::single(message, FinishReason::Error)
}

/// Auth rejections carry the plain message, not the `Error code:` rendering
pub fn auth_failure_envelope(failure: AuthFailure) -> ResponseEnvelope {
    error_envelope(failure.to_string())
}

pub fn upstream_failure_envelope(err: &UpstreamError) -> ResponseEnvelope {
    error_envelope(err.user_message())
}

/// Map the adapter's outcome onto the envelope. Pure: the same outcome always
/// produces the same envelope.
pub fn normalize(outcome: &Result<CompletionResult, UpstreamError>) -> ResponseEnvelope {
    match outcome {
        Ok(result) => completion_envelope(result),
        Err(err) => upstream_failure_envelope(err),
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
