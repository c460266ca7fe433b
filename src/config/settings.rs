//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Environment variables are applied on top by [`Config::apply_env`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::MAX_MESSAGE_BYTES;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication and abuse limits.
    #[serde(default)]
    pub security: SecurityConfig,

    /// WHOOP provider settings.
    #[serde(default)]
    pub whoop: WhoopConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Applies environment overrides using the given lookup function.
    ///
    /// Taking the lookup as a parameter keeps tests away from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("API_SECRET_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(host) = non_empty("HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "PORT" })?;
        }
        if let Some(environment) = non_empty("ENVIRONMENT") {
            self.server.environment = environment;
        }
        if let Some(id) = non_empty("WHOOP_CLIENT_ID") {
            self.whoop.client_id = Some(id);
        }
        if let Some(secret) = non_empty("WHOOP_CLIENT_SECRET") {
            self.whoop.client_secret = Some(secret);
        }
        if let Some(uri) = non_empty("WHOOP_REDIRECT_URI") {
            self.whoop.redirect_uri = uri;
        }
        if let Some(path) = non_empty("WHOOP_TOKEN_FILE") {
            self.whoop.token_file = Some(PathBuf::from(path));
        }
        if let Some(level) = non_empty("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.port must be non-zero".to_string(),
            });
        }
        if self.security.rate_limit_requests == 0 {
            return Err(ConfigError::ValidationError {
                message: "security.rate_limit_requests must be at least 1".to_string(),
            });
        }
        if self.security.rate_limit_window_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "security.rate_limit_window_secs must be at least 1".to_string(),
            });
        }
        if self.security.max_message_bytes == 0 || self.security.max_message_bytes > MAX_MESSAGE_BYTES {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "security.max_message_bytes must be between 1 and {MAX_MESSAGE_BYTES}"
                ),
            });
        }
        if let Some(ref key) = self.security.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "security.api_key cannot be blank".to_string(),
                });
            }
        }
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log format '{}'. Must be one of: text, json",
                    self.logging.format
                ),
            });
        }
        Ok(())
    }

    /// Whether the server runs with production hardening (restricted CORS).
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name ("production" restricts CORS).
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

/// Authentication, rate limiting and frame limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Shared secret expected in `X-API-Key`. Generated at startup if unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Admitted requests per client per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: usize,

    /// Sliding window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Largest inbound frame accepted by the codec.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Upper bound on a single tool invocation, in seconds. 0 disables it.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl SecurityConfig {
    /// The rate window as a [`Duration`].
    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// The per-tool timeout, if enabled.
    #[must_use]
    pub const fn tool_timeout(&self) -> Option<Duration> {
        if self.tool_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.tool_timeout_secs))
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_message_bytes: default_max_message_bytes(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

const fn default_rate_limit_requests() -> usize {
    60
}

const fn default_rate_limit_window_secs() -> u64 {
    60
}

const fn default_max_message_bytes() -> usize {
    MAX_MESSAGE_BYTES
}

const fn default_tool_timeout_secs() -> u64 {
    30
}

/// WHOOP provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhoopConfig {
    /// OAuth client identifier.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with WHOOP.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Where the provider token is persisted. Defaults to `~/.whoop_token.json`.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Base URL of the WHOOP developer API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// WHOOP OAuth authorisation endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// WHOOP OAuth token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl WhoopConfig {
    /// Resolves the token file path, falling back to the home directory.
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".whoop_token.json")
        })
    }
}

impl Default for WhoopConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            token_file: None,
            api_base: default_api_base(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
        }
    }
}

fn default_redirect_uri() -> String {
    "https://whoop-mcp.fly.dev/whoop/callback".to_string()
}

fn default_api_base() -> String {
    "https://api.prod.whoop.com/developer".to_string()
}

fn default_auth_url() -> String {
    "https://api.prod.whoop.com/oauth/oauth2/auth".to_string()
}

fn default_token_url() -> String {
    "https://api.prod.whoop.com/oauth/oauth2/token".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.rate_limit_requests, 60);
        assert_eq!(config.security.max_message_bytes, 10_000);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": { "host": "127.0.0.1", "port": 9000, "environment": "production" },
            "security": {
                "api_key": "s3cret",
                "rate_limit_requests": 10,
                "rate_limit_window_secs": 30,
                "max_message_bytes": 2048,
                "tool_timeout_secs": 0
            },
            "whoop": {
                "client_id": "abc",
                "redirect_uri": "http://localhost:8080/whoop/callback",
                "token_file": "/tmp/token.json"
            },
            "logging": { "level": "debug", "format": "json" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.is_production());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.security.api_key.as_deref(), Some("s3cret"));
        assert_eq!(config.security.rate_limit_window(), Duration::from_secs(30));
        assert_eq!(config.security.tool_timeout(), None);
        assert_eq!(config.whoop.token_path(), PathBuf::from("/tmp/token.json"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("API_SECRET_KEY", "from-env"),
                ("PORT", "9999"),
                ("WHOOP_CLIENT_ID", "client"),
                ("HOST", "   "),
            ]))
            .unwrap();

        assert_eq!(config.security.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.whoop.client_id.as_deref(), Some("client"));
        // Blank values are ignored.
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "PORT" }));
    }

    #[test]
    fn security_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(30)));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
    }

    #[test]
    fn reject_zero_rate_limit() {
        let json = r#"{ "security": { "rate_limit_requests": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn message_limit_cannot_exceed_frame_cap() {
        let json = r#"{ "security": { "max_message_bytes": 10001 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_message_bytes"));

        let json = r#"{ "security": { "max_message_bytes": 10000 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reject_unknown_log_format() {
        let json = r#"{ "logging": { "format": "xml" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
