//! Error types for the relay
//!
//! Two taxonomies reach the caller: credential failures detected before any
//! upstream call, and failures reported by the upstream adapter. Neither is
//! ever surfaced as a non-200 status; both end up as text inside the standard
//! response envelope.

use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{normalize::error_envelope, routes::metrics::record_upstream_error};

/// Credential check failures
///
/// The display text is the message delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("缺少 Authorization 请求头")]
    Missing,

    #[error("{0}")]
    MalformedScheme(SchemeProblem),

    #[error("API 密钥无效")]
    InvalidKey,
}

/// Why an `Authorization` header could not be read as `Bearer <token>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchemeProblem {
    /// Not exactly two space-separated tokens
    #[error("Authorization 请求头格式不正确")]
    Shape,

    /// Two tokens, but the scheme is not `Bearer`
    #[error("Authorization 请求头格式不正确, 需要使用 Bearer 认证")]
    NotBearer,
}

impl AuthFailure {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "missing",
            AuthFailure::MalformedScheme(_) => "malformed_scheme",
            AuthFailure::InvalidKey => "invalid_key",
        }
    }
}

/// Failures surfaced by the upstream adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Quota or rate-limit rejection (HTTP 429)
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The upstream reported a failure in its own error format
    #[error("upstream API error: {message}")]
    Api { message: String },

    /// HTTP-level failure without a recognizable upstream error body
    #[error("HTTP status {status}: {message}")]
    Transport { status: u16, message: String },

    /// Anything else: connection failures, undecodable payloads
    #[error("{message}")]
    Unknown { message: String },
}

impl UpstreamError {
    /// Label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::RateLimited { .. } => "rate_limited",
            UpstreamError::Api { .. } => "api_error",
            UpstreamError::Transport { .. } => "transport_error",
            UpstreamError::Unknown { .. } => "unknown",
        }
    }

    /// Status code reported to the caller inside the error text
    pub fn code(&self) -> String {
        match self {
            UpstreamError::RateLimited { .. } => "429".to_string(),
            UpstreamError::Transport { status, .. } => status.to_string(),
            UpstreamError::Api { .. } | UpstreamError::Unknown { .. } => "500".to_string(),
        }
    }

    /// Upstream HTTP status, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::RateLimited { .. } => Some(429),
            UpstreamError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code(),
            message: self.to_string(),
        }
    }

    /// Log the failure and count it under its kind. `phase` is where it
    /// surfaced: `request` or `stream`.
    pub fn report(&self, phase: &'static str) {
        tracing::warn!(
            kind = self.kind(),
            code = %self.code(),
            status = ?self.status(),
            phase,
            error = %self,
            "Upstream chat completion failed"
        );
        record_upstream_error(self.kind());
    }

    /// Text delivered to the caller, e.g.
    /// `Error code: 429 - {"error":{"code":"429","message":"..."}}`
    pub fn user_message(&self) -> String {
        self.envelope().render()
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 429 => UpstreamError::RateLimited {
                message: err.to_string(),
            },
            Some(status) => UpstreamError::Transport {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => UpstreamError::Unknown {
                message: err.to_string(),
            },
        }
    }
}

/// Normalized `{code, message}` shape for a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorEnvelopeBody<'a> {
    error: &'a ErrorEnvelope,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Render as `Error code: <code> - {"error":{...}}`
    pub fn render(&self) -> String {
        let body = serde_json::to_string(&ErrorEnvelopeBody { error: self })
            .unwrap_or_else(|_| format!("{{\"error\":{{\"code\":\"{}\"}}}}", self.code));
        format!("Error code: {} - {}", self.code, body)
    }
}

/// Faults outside both taxonomies
///
/// Caught by the handler's catch-all and rendered like any other failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new("500", self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed outside the upstream call");
        error_envelope(self.envelope().render()).into_response()
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
