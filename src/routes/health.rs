//! Health check endpoints
//!
//! - `/health` - Status with version and uptime
//! - `/health/live` - Liveness probe
//!
//! The relay keeps no connections of its own, so there is no dependency to
//! probe; the upstream is only contacted on behalf of callers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub upstream_deployment: String,
}

#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        upstream_deployment: state.config.azure_deployment.clone(),
    })
}

pub async fn liveness_check() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: HealthStatus::Healthy,
    })
}
