//! Chat Relay - minimal chat-completions gateway
//!
//! Authenticates callers with one static bearer token and relays chat
//! completions to a single Azure OpenAI deployment, re-chunking streamed
//! output into server-sent events.

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod proxy;
pub mod routes;
pub mod streaming;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::config::Config;
pub use crate::proxy::{AzureOpenAIProvider, ChatProvider};

/// Application state shared across all request handlers
///
/// Read-only after startup.
pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
    /// Upstream chat provider requests are forwarded to
    pub provider: Arc<dyn ChatProvider>,
}

impl AppState {
    /// Create the application state with the Azure OpenAI upstream
    pub fn new(config: Config) -> Result<Self> {
        // reqwest never retries on its own, so each call is a single attempt
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .build()?;

        let provider: Arc<dyn ChatProvider> = Arc::new(AzureOpenAIProvider::new(http_client, &config));

        Ok(Self::with_provider(config, provider))
    }

    /// Create the application state around an already-built provider
    pub fn with_provider(config: Config, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            provider,
        }
    }
}
