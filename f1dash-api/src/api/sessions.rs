//! Session, telemetry and catalogue endpoints
//!
//! `/api/f1/session` is the only cached route; telemetry and the Grand Prix
//! list always run the analysis script.

use axum::{
    extract::{Path, State},
    http::HeaderName,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use f1dash_common::session::supported_years;
use f1dash_common::SessionType;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{json_body, RawBody};
use crate::engine::EngineCommand;
use crate::error::ApiResult;
use crate::validation::{validate_session_request, validate_telemetry_request, validate_year};
use crate::AppState;

/// Response header reporting whether the session came from the cache
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-cache");

/// Session type entry for `/api/f1/sessions`
#[derive(Debug, Serialize)]
pub struct SessionTypeInfo {
    pub key: &'static str,
    pub name: &'static str,
}

/// GET /api/f1/years
pub async fn list_years() -> Json<Vec<i32>> {
    Json(supported_years())
}

/// GET /api/f1/sessions
pub async fn list_session_types() -> Json<Vec<SessionTypeInfo>> {
    Json(
        SessionType::ALL
            .iter()
            .map(|t| SessionTypeInfo {
                key: t.as_str(),
                name: t.display_name(),
            })
            .collect(),
    )
}

/// GET /api/f1/gps/:year
///
/// Grand Prix calendar for a season, passed through from the analysis script.
pub async fn list_grand_prix(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> ApiResult<Json<Value>> {
    let year = validate_year(&year)?;
    let schedule = state
        .engine
        .invoke(EngineCommand::GrandPrixList, &[year.to_string()])
        .await?;
    Ok(Json(schedule))
}

/// POST /api/f1/session
///
/// Body: `{year, gp, session, drivers?}`. Served from the session cache when
/// possible; the `X-Cache` header reports `HIT` or `MISS`.
pub async fn get_session(
    State(state): State<AppState>,
    payload: RawBody,
) -> ApiResult<impl IntoResponse> {
    let request = validate_session_request(&json_body(payload)?)?;

    let lookup = state
        .gateway
        .get_or_fetch_session(&request.key, request.drivers.as_deref())
        .await?;

    info!(key = %request.key, cache = lookup.status.as_str(), "Session served");
    Ok(([(CACHE_HEADER, lookup.status.as_str())], Json(lookup.payload)))
}

/// POST /api/f1/telemetry
///
/// Body: `{year, gp, session, driver1, lap1, driver2?, lap2?}`. Never cached.
pub async fn get_telemetry(
    State(state): State<AppState>,
    payload: RawBody,
) -> ApiResult<Json<Value>> {
    let request = validate_telemetry_request(&json_body(payload)?)?;
    let telemetry = state
        .engine
        .invoke(EngineCommand::Telemetry, &request.engine_args())
        .await?;
    Ok(Json(telemetry))
}

/// Build session and catalogue routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/f1/years", get(list_years))
        .route("/api/f1/sessions", get(list_session_types))
        .route("/api/f1/gps/:year", get(list_grand_prix))
        .route("/api/f1/session", post(get_session))
        .route("/api/f1/telemetry", post(get_telemetry))
}
