//! # F1 Dash Common Library
//!
//! Shared code for the F1 Dash services including:
//! - Session domain types (keys, session types, session and lap records)
//! - Bootstrap configuration loading
//! - Database initialization
//! - Common error type

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod session;

pub use error::{Error, Result};
pub use session::{LapRecord, SessionKey, SessionRecord, SessionType};
