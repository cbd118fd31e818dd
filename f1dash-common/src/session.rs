//! Session domain types
//!
//! A session is one on-track activity (practice, qualifying, race) at one
//! grand prix. Session payloads are produced by the external analysis engine
//! and treated as opaque JSON, except for the `laps` array which is decomposed
//! into [`LapRecord`]s when a session is first cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Oldest season the analysis engine has timing data for
pub const MIN_YEAR: i32 = 2018;

/// Newest season served by the dashboard
pub const MAX_YEAR: i32 = 2025;

/// Supported seasons, newest first
pub fn supported_years() -> Vec<i32> {
    (MIN_YEAR..=MAX_YEAR).rev().collect()
}

/// Session type within a race weekend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    FP1,
    FP2,
    FP3,
    Q,
    R,
}

impl SessionType {
    /// All session types in weekend order
    pub const ALL: [SessionType; 5] = [
        SessionType::FP1,
        SessionType::FP2,
        SessionType::FP3,
        SessionType::Q,
        SessionType::R,
    ];

    /// Short key passed to the analysis engine
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::FP1 => "FP1",
            SessionType::FP2 => "FP2",
            SessionType::FP3 => "FP3",
            SessionType::Q => "Q",
            SessionType::R => "R",
        }
    }

    /// Human readable name for the session picker
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionType::FP1 => "Practice 1",
            SessionType::FP2 => "Practice 2",
            SessionType::FP3 => "Practice 3",
            SessionType::Q => "Qualifying",
            SessionType::R => "Race",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        SessionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown session type '{}' (expected one of FP1, FP2, FP3, Q, R)",
                    s.trim()
                ))
            })
    }
}

/// Composite cache key identifying one session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    year: i32,
    grand_prix: String,
    session_type: SessionType,
}

impl SessionKey {
    /// Create a key; the grand prix name is trimmed
    pub fn new(year: i32, grand_prix: impl Into<String>, session_type: SessionType) -> Self {
        let grand_prix = grand_prix.into();
        Self {
            year,
            grand_prix: grand_prix.trim().to_string(),
            session_type,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn grand_prix(&self) -> &str {
        &self.grand_prix
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.grand_prix, self.session_type)
    }
}

/// Cached result of one successful session fetch
///
/// Records are created once and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub key: SessionKey,
    /// Session payload exactly as returned by the analysis engine
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new record with a fresh id
    pub fn new(key: SessionKey, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// One lap by one driver, derived from a session payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub session_id: Uuid,
    pub driver: String,
    pub lap_number: i64,
    /// Lap time in seconds
    pub lap_time: f64,
    pub sector1: Option<f64>,
    pub sector2: Option<f64>,
    pub sector3: Option<f64>,
    pub compound: String,
    pub is_personal_best: bool,
}

impl LapRecord {
    /// Decompose the `laps` array of a session payload
    ///
    /// Entries missing a driver, lap number or lap time are skipped. A missing
    /// compound is recorded as `UNKNOWN`.
    pub fn from_payload(session_id: Uuid, payload: &Value) -> Vec<LapRecord> {
        let Some(laps) = payload.get("laps").and_then(Value::as_array) else {
            return Vec::new();
        };

        laps.iter()
            .filter_map(|lap| {
                let driver = lap.get("driver")?.as_str()?.to_string();
                let lap_number = lap.get("lapNumber").and_then(as_lap_number)?;
                let lap_time = lap.get("lapTime")?.as_f64()?;
                let compound = lap
                    .get("compound")
                    .and_then(Value::as_str)
                    .map(str::to_ascii_uppercase)
                    .unwrap_or_else(|| "UNKNOWN".to_string());

                Some(LapRecord {
                    session_id,
                    driver,
                    lap_number,
                    lap_time,
                    sector1: lap.get("sector1").and_then(Value::as_f64),
                    sector2: lap.get("sector2").and_then(Value::as_f64),
                    sector3: lap.get("sector3").and_then(Value::as_f64),
                    compound,
                    is_personal_best: lap
                        .get("isPersonalBest")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            })
            .collect()
    }
}

// pandas occasionally hands lap numbers over as floats (e.g. 12.0)
fn as_lap_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    })
}
