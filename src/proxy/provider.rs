//! Upstream provider abstraction
//!
//! The relay forwards to exactly one upstream, but the handler only sees this
//! trait so the upstream can be swapped for a scripted one in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{envelope::ChatMessage, error::UpstreamError};

/// Incremental content deltas from a streaming completion
///
/// Dropping the stream releases the underlying upstream connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Outcome of a non-streaming completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Content of the first choice
    Content(String),
    /// The upstream returned no choices
    Empty,
}

/// Either shape `complete` can produce
pub enum Completion {
    Stream(DeltaStream),
    Finished(CompletionResult),
}

/// Trait defining the interface for the upstream chat provider
///
/// Implementations make at most one attempt per call. Failures propagate
/// immediately as [`UpstreamError`].
///
/// # Security
///
/// Implementations MUST never forward the caller's `Authorization` header;
/// the upstream credential comes from configuration.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Chat completion (non-streaming)
    async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<CompletionResult, UpstreamError>;

    /// Chat completion (streaming)
    ///
    /// Errors before the first delta are returned directly; later failures
    /// arrive as an `Err` item, after which the stream yields nothing more.
    async fn chat_completion_stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, UpstreamError>;

    /// Dispatch on the caller's stream flag
    async fn complete(&self, messages: &[ChatMessage], stream: bool) -> Result<Completion, UpstreamError> {
        if stream {
            self.chat_completion_stream(messages).await.map(Completion::Stream)
        } else {
            self.chat_completion(messages).await.map(Completion::Finished)
        }
    }
}
