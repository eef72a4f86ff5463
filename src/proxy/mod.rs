//! Proxy module
//!
//! Handles request forwarding to the upstream chat provider.

pub mod azure;
pub mod provider;

pub use azure::AzureOpenAIProvider;
pub use provider::{ChatProvider, Completion, CompletionResult, DeltaStream};
