//! Request validation
//!
//! Every request is validated and normalized here before any analysis
//! process is started. Validators take the raw JSON body so that schema
//! mismatches (wrong types, missing fields) are reported with the same
//! field-level detail as range violations.

use f1dash_common::session::{MAX_YEAR, MIN_YEAR};
use f1dash_common::{SessionKey, SessionType};
use serde_json::{Map, Value};
use thiserror::Error;

/// Request validation failure (HTTP 400)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field is missing, has the wrong type, or is out of range
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    /// The body is not a JSON object
    #[error("Malformed request body: {reason}")]
    MalformedBody { reason: String },
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidParameter {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Offending field name, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidParameter { field, .. } => Some(field),
            ValidationError::MalformedBody { .. } => None,
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Validated `POST /api/f1/session` body
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub key: SessionKey,
    /// Restrict the response to these drivers
    pub drivers: Option<Vec<String>>,
}

/// Validated `POST /api/f1/telemetry` body
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRequest {
    pub key: SessionKey,
    pub driver1: String,
    pub lap1: u32,
    pub driver2: Option<String>,
    pub lap2: Option<u32>,
}

impl TelemetryRequest {
    /// Positional engine arguments; the optional comparison pair is appended
    /// only as far as it is present
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = key_args(&self.key);
        args.push(self.driver1.clone());
        args.push(self.lap1.to_string());
        if let Some(driver2) = &self.driver2 {
            args.push(driver2.clone());
            if let Some(lap2) = self.lap2 {
                args.push(lap2.to_string());
            }
        }
        args
    }
}

/// Validated body for analyses of one driver's lap
#[derive(Debug, Clone, PartialEq)]
pub struct DriverLapRequest {
    pub key: SessionKey,
    pub driver: String,
    pub lap: u32,
}

impl DriverLapRequest {
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = key_args(&self.key);
        args.push(self.driver.clone());
        args.push(self.lap.to_string());
        args
    }
}

/// Validated body for analyses of one driver across a session
#[derive(Debug, Clone, PartialEq)]
pub struct DriverRequest {
    pub key: SessionKey,
    pub driver: String,
}

impl DriverRequest {
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = key_args(&self.key);
        args.push(self.driver.clone());
        args
    }
}

/// Validated body for multi-driver comparisons
#[derive(Debug, Clone, PartialEq)]
pub struct DriversRequest {
    pub key: SessionKey,
    pub drivers: Vec<String>,
}

impl DriversRequest {
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = key_args(&self.key);
        args.extend(self.drivers.iter().cloned());
        args
    }
}

/// Positional `<year> <gp> <session>` arguments
pub fn key_args(key: &SessionKey) -> Vec<String> {
    vec![
        key.year().to_string(),
        key.grand_prix().to_string(),
        key.session_type().as_str().to_string(),
    ]
}

/// Validate a session request: year, gp, session, optional drivers
pub fn validate_session_request(input: &Value) -> Result<SessionRequest> {
    let obj = as_object(input)?;
    Ok(SessionRequest {
        key: session_key(obj)?,
        drivers: optional_string_array(obj, "drivers")?,
    })
}

/// Validate a telemetry request
///
/// `driver2` and `lap2` are validated independently when present; a request
/// carrying only one of them is accepted.
pub fn validate_telemetry_request(input: &Value) -> Result<TelemetryRequest> {
    let obj = as_object(input)?;
    Ok(TelemetryRequest {
        key: session_key(obj)?,
        driver1: required_string(obj, "driver1")?,
        lap1: required_lap(obj, "lap1")?,
        driver2: optional_string(obj, "driver2")?,
        lap2: optional_lap(obj, "lap2")?,
    })
}

/// Validate a request naming a driver and lap
pub fn validate_driver_lap_request(input: &Value) -> Result<DriverLapRequest> {
    let obj = as_object(input)?;
    Ok(DriverLapRequest {
        key: session_key(obj)?,
        driver: required_string(obj, "driver")?,
        lap: required_lap(obj, "lap")?,
    })
}

/// Validate a request naming one driver
pub fn validate_driver_request(input: &Value) -> Result<DriverRequest> {
    let obj = as_object(input)?;
    Ok(DriverRequest {
        key: session_key(obj)?,
        driver: required_string(obj, "driver")?,
    })
}

/// Validate a request naming at least one driver
pub fn validate_drivers_request(input: &Value) -> Result<DriversRequest> {
    let obj = as_object(input)?;
    let key = session_key(obj)?;
    let drivers = optional_string_array(obj, "drivers")?
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ValidationError::invalid("drivers", "at least one driver is required"))?;
    Ok(DriversRequest { key, drivers })
}

/// Validate a session-wide request (year, gp, session only)
pub fn validate_session_key(input: &Value) -> Result<SessionKey> {
    session_key(as_object(input)?)
}

/// Validate a year taken from a path segment
pub fn validate_year(raw: &str) -> Result<i32> {
    year_value(&Value::String(raw.to_string()))
}

fn as_object(input: &Value) -> Result<&Map<String, Value>> {
    input.as_object().ok_or_else(|| ValidationError::MalformedBody {
        reason: "expected a JSON object".to_string(),
    })
}

fn session_key(obj: &Map<String, Value>) -> Result<SessionKey> {
    let year = match present(obj, "year") {
        Some(value) => year_value(value)?,
        None => return Err(ValidationError::invalid("year", "is required")),
    };
    let gp = required_string(obj, "gp")?;
    let session = required_string(obj, "session")?;
    let session_type = session
        .parse::<SessionType>()
        .map_err(|_| ValidationError::invalid("session", "must be one of FP1, FP2, FP3, Q, R"))?;

    Ok(SessionKey::new(year, gp, session_type))
}

fn year_value(value: &Value) -> Result<i32> {
    let year = integer_value(value)
        .ok_or_else(|| ValidationError::invalid("year", "must be an integer"))?;

    if !(i64::from(MIN_YEAR)..=i64::from(MAX_YEAR)).contains(&year) {
        return Err(ValidationError::invalid(
            "year",
            format!(
                "{} is outside the supported range {}-{}",
                year, MIN_YEAR, MAX_YEAR
            ),
        ));
    }

    // In range, so the narrowing cannot truncate
    Ok(year as i32)
}

// Accepts JSON integers and all-digit strings (form inputs send strings)
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

// Missing and explicit null are treated the same
fn present<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn required_string(obj: &Map<String, Value>, field: &str) -> Result<String> {
    optional_string(obj, field)?.ok_or_else(|| ValidationError::invalid(field, "is required"))
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(Value::String(_)) => Err(ValidationError::invalid(field, "must not be empty")),
        Some(_) => Err(ValidationError::invalid(field, "must be a string")),
    }
}

fn required_lap(obj: &Map<String, Value>, field: &str) -> Result<u32> {
    optional_lap(obj, field)?.ok_or_else(|| ValidationError::invalid(field, "is required"))
}

fn optional_lap(obj: &Map<String, Value>, field: &str) -> Result<Option<u32>> {
    let Some(value) = present(obj, field) else {
        return Ok(None);
    };

    integer_value(value)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| ValidationError::invalid(field, "must be a positive integer"))
}

fn optional_string_array(obj: &Map<String, Value>, field: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = present(obj, field) else {
        return Ok(None);
    };

    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::invalid(field, "must be an array of strings"))?;

    items
        .iter()
        .map(|item| match item.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(ValidationError::invalid(
                field,
                "must contain only non-empty strings",
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
