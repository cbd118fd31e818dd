//! Analysis engine port
//!
//! All data retrieval and numeric work happens in an external analysis
//! process that takes a command plus positional arguments and prints a single
//! JSON document on stdout. This module defines the port the rest of the
//! service talks to and the error taxonomy for process-level failures.
//!
//! Implementations:
//! - [`ProcessEngine`]: spawns the real analysis script
//! - [`CannedEngine`]: returns scripted JSON without spawning anything

pub mod canned;
pub mod process;

pub use canned::{CannedEngine, Invocation};
pub use process::ProcessEngine;

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Longest excerpt of unparseable output carried in errors
pub const MAX_EXCERPT_CHARS: usize = 200;

/// Commands understood by the analysis script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    Session,
    Telemetry,
    GrandPrixList,
    DownforceAnalysis,
    CornerAnalysis,
    BrakeAnalysis,
    TireAnalysis,
    EnergyAnalysis,
    WeatherAnalysis,
    PitStopAnalysis,
    DrsAnalysis,
    StrategyAnalysis,
    RaceInsights,
    TireDegradation,
    RacePace,
    GearUsage,
    FuelEffect,
    ThrottleTrace,
}

/// How the child process is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Long-running fetch; stdout and stderr are drained as they arrive
    Streamed,
    /// Single-shot analysis; output is collected once the process exits
    Blocking,
}

impl EngineCommand {
    /// Command word passed as the first positional argument
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineCommand::Session => "session",
            EngineCommand::Telemetry => "telemetry",
            EngineCommand::GrandPrixList => "gps",
            EngineCommand::DownforceAnalysis => "downforce-analysis",
            EngineCommand::CornerAnalysis => "corner-analysis",
            EngineCommand::BrakeAnalysis => "brake-analysis",
            EngineCommand::TireAnalysis => "tire-analysis",
            EngineCommand::EnergyAnalysis => "energy-analysis",
            EngineCommand::WeatherAnalysis => "weather-analysis",
            EngineCommand::PitStopAnalysis => "pitstop-analysis",
            EngineCommand::DrsAnalysis => "drs-analysis",
            EngineCommand::StrategyAnalysis => "strategy-analysis",
            EngineCommand::RaceInsights => "race-insights",
            EngineCommand::TireDegradation => "tire-degradation",
            EngineCommand::RacePace => "race-pace",
            EngineCommand::GearUsage => "gear-usage",
            EngineCommand::FuelEffect => "fuel-effect",
            EngineCommand::ThrottleTrace => "throttle-trace",
        }
    }

    pub fn mode(&self) -> InvocationMode {
        match self {
            EngineCommand::Session | EngineCommand::Telemetry | EngineCommand::GrandPrixList => {
                InvocationMode::Streamed
            }
            _ => InvocationMode::Blocking,
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis process failure
///
/// None of these are retried; each fails the request that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The process could not be started (missing executable, permissions)
    #[error("Failed to start analysis process '{program}': {reason}")]
    SpawnFailure { program: String, reason: String },

    /// The process exited unsuccessfully
    #[error("Analysis process exited with {}: {}", describe_exit(.code), .stderr.trim())]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The process succeeded but wrote nothing to stdout
    #[error("Analysis process produced no output")]
    EmptyOutput,

    /// Stdout was not a JSON document
    #[error("Analysis process returned malformed output ({reason}): {excerpt}")]
    MalformedOutput { reason: String, excerpt: String },

    /// The process ran past its deadline and was killed
    #[error("Analysis process timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    /// Reading the process pipes or waiting for exit failed
    #[error("Failed to collect analysis process output: {reason}")]
    Io { reason: String },
}

impl EngineError {
    /// Stable error kind name for responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SpawnFailure { .. } => "SpawnFailure",
            EngineError::NonZeroExit { .. } => "NonZeroExit",
            EngineError::EmptyOutput => "EmptyOutput",
            EngineError::MalformedOutput { .. } => "MalformedOutput",
            EngineError::Timeout { .. } => "Timeout",
            EngineError::Io { .. } => "Io",
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Port to the external analysis capability
#[async_trait::async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Run `command` with positional `args` and return its JSON output as-is
    async fn invoke(&self, command: EngineCommand, args: &[String]) -> Result<Value, EngineError>;
}

/// Parse captured stdout into a JSON value
///
/// Whitespace-only output counts as empty. No schema checks are applied.
pub fn parse_output(stdout: &[u8]) -> Result<Value, EngineError> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(EngineError::EmptyOutput);
    }

    serde_json::from_str(trimmed).map_err(|e| EngineError::MalformedOutput {
        reason: e.to_string(),
        excerpt: excerpt(trimmed),
    })
}

fn excerpt(raw: &str) -> String {
    if raw.chars().count() <= MAX_EXCERPT_CHARS {
        return raw.to_string();
    }
    let mut cut: String = raw.chars().take(MAX_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_output_returns_value_unchanged() {
        let value = parse_output(br#"{"drivers":["VER"],"laps":[{"lapTime":90.1}]}"#).unwrap();
        assert_eq!(value, json!({ "drivers": ["VER"], "laps": [{ "lapTime": 90.1 }] }));
    }

    #[test]
    fn test_parse_output_keeps_full_precision_floats() {
        let value = parse_output(b"{\"averageLapTime\": 124.52738143973751}").unwrap();
        let parsed = value["averageLapTime"].as_f64().unwrap();
        assert_eq!(parsed.to_bits(), 124.52738143973751_f64.to_bits());
        assert_eq!(value.to_string(), r#"{"averageLapTime":124.52738143973751}"#);
    }

    #[test]
    fn test_parse_output_empty_is_error() {
        assert_eq!(parse_output(b""), Err(EngineError::EmptyOutput));
        assert_eq!(parse_output(b"  \n\t"), Err(EngineError::EmptyOutput));
    }

    #[test]
    fn test_parse_output_log_line_is_malformed() {
        let err = parse_output(b"Loading session data...\n{\"laps\": []}").unwrap_err();
        match err {
            EngineError::MalformedOutput { excerpt, .. } => {
                assert!(excerpt.starts_with("Loading session data..."));
            }
            other => panic!("expected MalformedOutput, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_excerpt_is_truncated() {
        let noise = "x".repeat(MAX_EXCERPT_CHARS * 3);
        match parse_output(noise.as_bytes()).unwrap_err() {
            EngineError::MalformedOutput { excerpt, .. } => {
                assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS + 3);
                assert!(excerpt.ends_with("..."));
            }
            other => panic!("expected MalformedOutput, got {:?}", other),
        }
    }

    #[test]
    fn test_non_zero_exit_message_has_code_and_stderr() {
        let err = EngineError::NonZeroExit {
            code: Some(1),
            stderr: "Error: driver not found\n".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("exit code 1"), "{}", message);
        assert!(message.contains("driver not found"), "{}", message);
        assert_eq!(err.kind(), "NonZeroExit");
    }

    #[test]
    fn test_command_modes() {
        assert_eq!(EngineCommand::Session.mode(), InvocationMode::Streamed);
        assert_eq!(EngineCommand::GrandPrixList.as_str(), "gps");
        assert_eq!(EngineCommand::PitStopAnalysis.as_str(), "pitstop-analysis");
        assert_eq!(EngineCommand::RaceInsights.mode(), InvocationMode::Blocking);
    }
}
