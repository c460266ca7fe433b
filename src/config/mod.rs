//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, layering
//! environment variables on top, and validating the result.
//!
//! # Configuration Sources
//!
//! Settings are resolved in the following order (later wins):
//!
//! 1. Built-in defaults
//! 2. The configuration file:
//!    - Path specified on the command line, or
//!    - **Linux/macOS:** `~/.whoop-mcp-gateway/config.json`
//!    - **Windows:** `%USERPROFILE%\.whoop-mcp-gateway\config.json`
//! 3. Environment variables (`API_SECRET_KEY`, `PORT`, `WHOOP_CLIENT_ID`, ...)
//!
//! A missing default file is not an error; a missing explicit path is.

mod settings;

pub use settings::{Config, LoggingConfig, SecurityConfig, ServerConfig, WhoopConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.whoop-mcp-gateway/`
/// - **Windows:** `%USERPROFILE%\.whoop-mcp-gateway\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".whoop-mcp-gateway"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration file (if any) and applies process environment overrides.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - An environment override is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = read_config_file(path)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Reads the configuration file without environment overrides or validation.
///
/// # Errors
///
/// See [`load_config`].
pub fn read_config_file(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path,
        source: e,
    })
}
