//! Error types for whoop-mcp-gateway.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! All error variants that could potentially contain sensitive data
//! use generic descriptions instead of including the actual values.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// An environment variable held a value that could not be used.
    #[error("invalid value for environment variable {name}")]
    InvalidEnv {
        /// Name of the offending variable. The value is deliberately omitted.
        name: &'static str,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that stop the HTTP/WebSocket server itself.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The host/port pair did not form a socket address.
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    /// The accept loop failed.
    #[error("server on {addr} terminated")]
    Serve {
        /// Address the server was listening on.
        addr: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The outbound HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// Two tools were registered under the same name.
    #[error(transparent)]
    Registry(#[from] crate::tools::RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn invalid_env_names_variable_only() {
        let error = ConfigError::InvalidEnv { name: "PORT" };
        assert_eq!(error.to_string(), "invalid value for environment variable PORT");
    }

    #[test]
    fn bind_error_keeps_source() {
        use std::error::Error as _;

        let error = ServerError::Bind {
            addr: "0.0.0.0:8080".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(error.to_string().contains("0.0.0.0:8080"));
        assert!(error.source().is_some());
    }
}
