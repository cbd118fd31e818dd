//! Analysis endpoints
//!
//! Each route validates its body, runs one analysis command and returns the
//! script's JSON unchanged. Routes are grouped by the parameters they take.

use axum::{
    extract::State,
    routing::{post, MethodRouter},
    Json, Router,
};
use serde_json::Value;
use tracing::debug;

use super::{json_body, RawBody};
use crate::engine::EngineCommand;
use crate::error::ApiResult;
use crate::validation::{
    key_args, validate_driver_lap_request, validate_driver_request, validate_drivers_request,
    validate_session_key,
};
use crate::AppState;

/// Routes taking `{year, gp, session, driver, lap}`
const DRIVER_LAP_ROUTES: &[(&str, EngineCommand)] = &[
    ("/api/f1/downforce-analysis", EngineCommand::DownforceAnalysis),
    ("/api/f1/corner-analysis", EngineCommand::CornerAnalysis),
    ("/api/f1/brake-analysis", EngineCommand::BrakeAnalysis),
    ("/api/f1/tire-analysis", EngineCommand::TireAnalysis),
    ("/api/f1/energy-analysis", EngineCommand::EnergyAnalysis),
    ("/api/f1/drs-analysis", EngineCommand::DrsAnalysis),
    ("/api/f1/gear-usage", EngineCommand::GearUsage),
    ("/api/f1/throttle-trace", EngineCommand::ThrottleTrace),
];

/// Routes taking `{year, gp, session}`
const SESSION_ROUTES: &[(&str, EngineCommand)] = &[
    ("/api/f1/weather-analysis", EngineCommand::WeatherAnalysis),
    ("/api/f1/pitstop-analysis", EngineCommand::PitStopAnalysis),
    ("/api/f1/strategy-analysis", EngineCommand::StrategyAnalysis),
    ("/api/f1/race-insights", EngineCommand::RaceInsights),
];

/// Routes taking `{year, gp, session, driver}`
const DRIVER_ROUTES: &[(&str, EngineCommand)] = &[
    ("/api/f1/tire-degradation", EngineCommand::TireDegradation),
    ("/api/f1/fuel-effect", EngineCommand::FuelEffect),
];

/// Routes taking `{year, gp, session, drivers: [..]}`
const DRIVERS_ROUTES: &[(&str, EngineCommand)] =
    &[("/api/f1/race-pace", EngineCommand::RacePace)];

async fn run(state: &AppState, command: EngineCommand, args: Vec<String>) -> ApiResult<Json<Value>> {
    debug!(command = %command, args = ?args, "Running analysis");
    let result = state.engine.invoke(command, &args).await?;
    Ok(Json(result))
}

async fn driver_lap_analysis(
    state: AppState,
    command: EngineCommand,
    payload: RawBody,
) -> ApiResult<Json<Value>> {
    let request = validate_driver_lap_request(&json_body(payload)?)?;
    run(&state, command, request.engine_args()).await
}

async fn session_analysis(
    state: AppState,
    command: EngineCommand,
    payload: RawBody,
) -> ApiResult<Json<Value>> {
    let key = validate_session_key(&json_body(payload)?)?;
    run(&state, command, key_args(&key)).await
}

async fn driver_analysis(
    state: AppState,
    command: EngineCommand,
    payload: RawBody,
) -> ApiResult<Json<Value>> {
    let request = validate_driver_request(&json_body(payload)?)?;
    run(&state, command, request.engine_args()).await
}

async fn drivers_analysis(
    state: AppState,
    command: EngineCommand,
    payload: RawBody,
) -> ApiResult<Json<Value>> {
    let request = validate_drivers_request(&json_body(payload)?)?;
    run(&state, command, request.engine_args()).await
}

fn driver_lap_route(command: EngineCommand) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, payload: RawBody| {
        driver_lap_analysis(state, command, payload)
    })
}

fn session_route(command: EngineCommand) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, payload: RawBody| {
        session_analysis(state, command, payload)
    })
}

fn driver_route(command: EngineCommand) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, payload: RawBody| {
        driver_analysis(state, command, payload)
    })
}

fn drivers_route(command: EngineCommand) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, payload: RawBody| {
        drivers_analysis(state, command, payload)
    })
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    let mut router = Router::new();

    for &(path, command) in DRIVER_LAP_ROUTES {
        router = router.route(path, driver_lap_route(command));
    }
    for &(path, command) in SESSION_ROUTES {
        router = router.route(path, session_route(command));
    }
    for &(path, command) in DRIVER_ROUTES {
        router = router.route(path, driver_route(command));
    }
    for &(path, command) in DRIVERS_ROUTES {
        router = router.route(path, drivers_route(command));
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_route_is_unique_and_uses_its_own_command() {
        let all: Vec<_> = DRIVER_LAP_ROUTES
            .iter()
            .chain(SESSION_ROUTES)
            .chain(DRIVER_ROUTES)
            .chain(DRIVERS_ROUTES)
            .collect();

        let paths: HashSet<_> = all.iter().map(|(path, _)| *path).collect();
        let commands: HashSet<_> = all.iter().map(|(_, command)| *command).collect();
        assert_eq!(paths.len(), all.len());
        assert_eq!(commands.len(), all.len());
        assert_eq!(all.len(), 15);
    }

    #[test]
    fn test_routes_are_named_after_their_command() {
        for (path, command) in DRIVER_LAP_ROUTES
            .iter()
            .chain(SESSION_ROUTES)
            .chain(DRIVER_ROUTES)
            .chain(DRIVERS_ROUTES)
        {
            assert_eq!(path.strip_prefix("/api/f1/"), Some(command.as_str()));
        }
    }
}
