//! HTTP API handlers for f1dash-api

pub mod analysis;
pub mod health;
pub mod sessions;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use sessions::session_routes;

use std::any::Any;

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::validation::ValidationError;

/// Request body as extracted by axum, before validation
pub type RawBody = Result<Json<Value>, JsonRejection>;

/// Unwrap a JSON body, reporting parse failures as validation errors
pub(crate) fn json_body(payload: RawBody) -> ApiResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            ApiError::Validation(ValidationError::MalformedBody {
                reason: rejection.body_text(),
            })
        })
}

/// Turn a handler panic into a 500 JSON response
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::Internal(format!("handler panicked: {}", message)).into_response()
}
