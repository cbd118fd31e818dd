//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
    pub uptime_seconds: i64,
    /// Number of cached sessions, absent when the store cannot be read
    pub cached_sessions: Option<usize>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cached_sessions = match state.gateway.store().session_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Health check could not read session store: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: if cached_sessions.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "f1dash-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        uptime_seconds: (Utc::now() - state.startup_time).num_seconds(),
        cached_sessions,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
