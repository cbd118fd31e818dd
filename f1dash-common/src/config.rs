//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable (applied by the binary through clap)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! This module owns tiers 3 and 4.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional in the file; missing values fall back to the
/// compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// External analysis engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Interpreter used to run the analysis script
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Path to the analysis script
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Working directory for the child process (the script keeps its
    /// download cache relative to it)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Deadline per invocation in seconds; 0 disables the deadline
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script: default_script(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Session cache persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite database file; the cache lives in memory when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("python/f1_data_fetcher.py")
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Config file that [`load_config`] will read, if any
///
/// An explicit path is always returned, even if missing, so that loading it
/// fails loudly. Otherwise the platform config file is returned when present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.exists()),
    }
}

/// Load bootstrap configuration
///
/// Reads the file chosen by [`resolve_config_path`], or returns compiled
/// defaults when there is none. Does not log; callers report the path from
/// [`resolve_config_path`] once logging is up.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(explicit) {
        Some(path) => TomlConfig::from_file(&path),
        None => Ok(TomlConfig::default()),
    }
}

/// Platform config file location (`~/.config/f1dash/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("f1dash").join("config.toml"))
}
