//! HTTP routes for the relay
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod chat;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
///
/// Credentials are checked inside the chat handler, so no route carries an
/// auth layer.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
