//! f1dash-api library interface
//!
//! HTTP backend for the F1 telemetry dashboard. Requests are validated, then
//! answered from the session cache or by running the analysis script.

pub mod api;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod store;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::AnalysisEngine;
use crate::gateway::SessionGateway;
use crate::store::SessionStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Cached session lookups
    pub gateway: Arc<SessionGateway>,
    /// Analysis script runner for uncached commands
    pub engine: Arc<dyn AnalysisEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            gateway: Arc::new(SessionGateway::new(store, Arc::clone(&engine))),
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// The dashboard frontend is served from another origin, so CORS is open.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::analysis_routes())
        .merge(api::health_routes())
        .layer(CatchPanicLayer::custom(api::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("lap index out of range")
    }

    #[tokio::test]
    async fn test_panicking_handler_returns_json_500() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(api::panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("lap index out of range"));
    }
}
