//! Error types for f1dash-api
//!
//! Every handler returns [`ApiResult`]; failures are rendered as a JSON body
//! of the form `{"error": {"code": ..., "message": ...}}`. Validation errors
//! map to 400 and carry the offending field. Analysis and store failures map
//! to 500; debug builds also include the full error chain under `detail`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

use crate::engine::EngineError;
use crate::gateway::GatewayError;
use crate::validation::ValidationError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request parameters or body (400)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Analysis process failure (500)
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Session cache failure (500)
    #[error("Session store error: {0}")]
    Store(#[from] f1dash_common::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Engine(e) => ApiError::Engine(e),
            GatewayError::Store(e) => ApiError::Store(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) | ApiError::Store(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(ValidationError::InvalidParameter { .. }) => "INVALID_PARAMETER",
            ApiError::Validation(ValidationError::MalformedBody { .. }) => "MALFORMED_BODY",
            ApiError::Engine(_) => "ANALYSIS_FAILED",
            ApiError::Store(_) => "STORE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let mut body = Map::new();
        body.insert("code".to_string(), json!(self.code()));
        body.insert("message".to_string(), json!(self.to_string()));

        match &self {
            ApiError::Validation(e) => {
                if let Some(field) = e.field() {
                    body.insert("field".to_string(), json!(field));
                }
            }
            ApiError::Engine(e) => {
                body.insert("kind".to_string(), json!(e.kind()));
            }
            ApiError::Store(_) | ApiError::Internal(_) => {}
        }

        if cfg!(debug_assertions) && status.is_server_error() {
            body.insert("detail".to_string(), json!(format!("{:?}", self)));
        }

        (status, Json(json!({ "error": Value::Object(body) }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_is_400_with_field() {
        let err = ApiError::from(ValidationError::InvalidParameter {
            field: "year".to_string(),
            reason: "2030 is outside the supported range 2018-2025".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_PARAMETER");
        assert_eq!(body["error"]["field"], "year");
        assert!(body["error"]["message"].as_str().unwrap().contains("2018-2025"));
        assert!(body["error"].get("detail").is_none());
    }

    #[tokio::test]
    async fn test_engine_error_is_500_with_kind() {
        let err = ApiError::from(GatewayError::Engine(EngineError::EmptyOutput));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "ANALYSIS_FAILED");
        assert_eq!(body["error"]["kind"], "EmptyOutput");
        assert_eq!(
            body["error"]["message"],
            "Analysis process produced no output"
        );
    }
}
