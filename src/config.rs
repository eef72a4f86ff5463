//! Configuration management for the relay
//!
//! Configuration is loaded from environment variables once at startup and is
//! read-only afterwards.

use anyhow::{bail, Context, Result};
use std::env;

/// Default sub-chunk size for streamed deltas
pub const DEFAULT_SUB_CHUNK_SIZE: usize = 2;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// The single bearer token callers must present
    pub api_key: String,

    /// Azure OpenAI resource endpoint
    pub azure_endpoint: String,
    /// Azure OpenAI credential
    pub azure_api_key: String,
    /// Azure OpenAI `api-version` query parameter
    pub azure_api_version: String,
    /// Deployment (model) name requests are sent to
    pub azure_deployment: String,

    /// Characters per streamed frame
    pub sub_chunk_size: usize,
    /// Transport timeout for upstream requests
    pub upstream_timeout_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            host: env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("RELAY_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid RELAY_PORT")?,

            api_key: env::var("RELAY_API_KEY").context("RELAY_API_KEY must be set")?,

            azure_endpoint: env::var("AZURE_OPENAI_ENDPOINT")
                .context("AZURE_OPENAI_ENDPOINT must be set")?,
            azure_api_key: env::var("AZURE_OPENAI_KEY").context("AZURE_OPENAI_KEY must be set")?,
            azure_api_version: env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-01".to_string()),
            azure_deployment: env::var("AZURE_OPENAI_DEPLOYMENT")
                .context("AZURE_OPENAI_DEPLOYMENT must be set")?,

            sub_chunk_size: env::var("RELAY_SUB_CHUNK_SIZE")
                .unwrap_or_else(|_| DEFAULT_SUB_CHUNK_SIZE.to_string())
                .parse()
                .context("Invalid RELAY_SUB_CHUNK_SIZE")?,
            upstream_timeout_seconds: env::var("UPSTREAM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid UPSTREAM_TIMEOUT_SECONDS")?,
        };

        if config.sub_chunk_size == 0 {
            bail!("RELAY_SUB_CHUNK_SIZE must be at least 1");
        }

        Ok(config)
    }
}
