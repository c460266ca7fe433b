//! WHOOP OAuth authorization-code flow.
//!
//! `start` issues a random `state` and the provider authorization URL.
//! `callback` accepts only states issued within the last ten minutes, each
//! exactly once, then exchanges the code for a token and persists it.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::WhoopConfig;
use crate::security::random_token;
use crate::tools::token::{TokenStore, TokenStoreError};

/// Scopes requested from WHOOP.
pub const SCOPES: &str =
    "read:profile read:body_measurement read:cycles read:recovery read:sleep read:workout";

/// How long an issued `state` stays valid.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Errors from the OAuth flow. Each maps to a fixed public response.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Client id or secret missing from configuration.
    #[error("WHOOP client credentials are not configured")]
    NotConfigured,

    /// The configured authorization URL does not parse.
    #[error("invalid authorization URL: {0}")]
    InvalidAuthUrl(String),

    /// The provider redirected back with an error.
    #[error("provider returned error: {0}")]
    Provider(String),

    /// No `code` in the callback.
    #[error("missing authorization code")]
    MissingCode,

    /// `state` absent, unknown, reused or expired.
    #[error("invalid or expired state")]
    InvalidState,

    /// The token endpoint answered with a non-success status.
    #[error("token exchange failed with status {status}")]
    Exchange {
        /// HTTP status from the token endpoint.
        status: u16,
    },

    /// The token endpoint could not be reached or answered garbage.
    #[error("token request failed")]
    Request(#[source] reqwest::Error),

    /// The token could not be persisted.
    #[error("failed to store token")]
    Storage(#[source] TokenStoreError),
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotConfigured | Self::InvalidAuthUrl(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "WHOOP client ID not configured",
                    "message": "Server configuration error. Please contact administrator."
                }),
            ),
            Self::Provider(details) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "WHOOP authentication failed",
                    "details": details,
                    "message": "Please try authenticating again"
                }),
            ),
            Self::MissingCode => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Missing authorization code",
                    "message": "Please start the authentication process again"
                }),
            ),
            Self::InvalidState => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid or expired state",
                    "message": "Please start the authentication process again"
                }),
            ),
            Self::Exchange { status } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Token exchange failed",
                    "status_code": status,
                    "message": "Failed to exchange authorization code for access token"
                }),
            ),
            Self::Request(_) | Self::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Authentication processing failed",
                    "message": "An error occurred while processing the authentication"
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Body of a successful `/whoop/auth` response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStart {
    /// Where to send the user.
    pub auth_url: String,
    /// The issued state.
    pub state: String,
    /// Human-readable next step.
    pub instructions: &'static str,
    /// Registered redirect URI.
    pub callback_uri: String,
}

/// Query string of `/whoop/callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// State issued by [`OAuthFlow::start`].
    pub state: Option<String>,
}

/// Body of a successful `/whoop/callback` response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthComplete {
    /// Always true.
    pub success: bool,
    /// Human-readable summary.
    pub message: &'static str,
    /// Token type reported by the provider.
    pub token_type: Option<String>,
    /// Token lifetime in seconds.
    pub expires_in: Option<u64>,
    /// Human-readable next step.
    pub instructions: &'static str,
}

/// Issues and redeems OAuth states.
pub struct OAuthFlow {
    http: reqwest::Client,
    config: WhoopConfig,
    tokens: TokenStore,
    pending: DashMap<String, Instant>,
}

impl std::fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("token_url", &self.config.token_url)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl OAuthFlow {
    /// Creates a flow for the given provider settings.
    #[must_use]
    pub fn new(http: reqwest::Client, config: WhoopConfig, tokens: TokenStore) -> Self {
        Self {
            http,
            config,
            tokens,
            pending: DashMap::new(),
        }
    }

    /// Issues a state and builds the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns an error if no client id is configured or the authorization
    /// URL is invalid.
    pub fn start(&self) -> Result<AuthStart, OAuthError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(OAuthError::NotConfigured)?;

        let state = random_token();
        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", client_id),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("state", state.as_str()),
            ],
        )
        .map_err(|_| OAuthError::InvalidAuthUrl(self.config.auth_url.clone()))?;

        self.prune();
        self.pending.insert(state.clone(), Instant::now());
        tracing::info!(pending = self.pending.len(), "Issued OAuth state");

        Ok(AuthStart {
            auth_url: url.into(),
            state,
            instructions: "Visit the auth_url to authenticate with WHOOP",
            callback_uri: self.config.redirect_uri.clone(),
        })
    }

    /// Validates the callback, exchanges the code and stores the token.
    ///
    /// # Errors
    ///
    /// Returns an error for provider errors, a missing code, an unknown or
    /// expired state, or a failed exchange.
    pub async fn callback(&self, params: CallbackParams) -> Result<AuthComplete, OAuthError> {
        if let Some(error) = params.error {
            tracing::warn!(error = %error, "WHOOP OAuth error");
            return Err(OAuthError::Provider(error));
        }
        let code = params.code.ok_or(OAuthError::MissingCode)?;
        if !params.state.as_deref().is_some_and(|s| self.redeem(s)) {
            tracing::warn!("OAuth callback with unknown or expired state");
            return Err(OAuthError::InvalidState);
        }

        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(OAuthError::NotConfigured);
        };

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token request failed");
                OAuthError::Request(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Token exchange failed");
            return Err(OAuthError::Exchange {
                status: status.as_u16(),
            });
        }

        let raw: Value = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Token response was not JSON");
            OAuthError::Request(e)
        })?;
        let token = self.tokens.save(&raw).await.map_err(|e| {
            tracing::error!(error = %e, path = %self.tokens.path().display(), "Failed to store token");
            OAuthError::Storage(e)
        })?;

        tracing::info!("WHOOP authentication successful");
        Ok(AuthComplete {
            success: true,
            message: "WHOOP authentication successful!",
            token_type: token.token_type,
            expires_in: token.expires_in,
            instructions: "You can now close this tab and use WHOOP tools in your MCP client.",
        })
    }

    /// Removes `state` and reports whether it was issued and still fresh.
    fn redeem(&self, state: &str) -> bool {
        self.pending
            .remove(state)
            .is_some_and(|(_, issued)| issued.elapsed() < STATE_TTL)
    }

    fn prune(&self) {
        self.pending.retain(|_, issued| issued.elapsed() < STATE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(client_id: Option<&str>) -> OAuthFlow {
        let config = WhoopConfig {
            client_id: client_id.map(str::to_string),
            client_secret: Some("shh".to_string()),
            ..WhoopConfig::default()
        };
        OAuthFlow::new(
            reqwest::Client::new(),
            config,
            TokenStore::new("/nonexistent/token.json"),
        )
    }

    #[test]
    fn start_requires_client_id() {
        assert!(matches!(flow(None).start(), Err(OAuthError::NotConfigured)));
    }

    #[test]
    fn start_builds_encoded_url() {
        let start = flow(Some("abc")).start().unwrap();
        let url = reqwest::Url::parse(&start.auth_url).unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "abc");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], SCOPES);
        assert_eq!(query["state"], start.state);
        assert_eq!(start.callback_uri, WhoopConfig::default().redirect_uri);
    }

    #[test]
    fn states_are_single_use() {
        let flow = flow(Some("abc"));
        let state = flow.start().unwrap().state;
        assert!(flow.redeem(&state));
        assert!(!flow.redeem(&state));
        assert!(!flow.redeem("never-issued"));
    }

    #[tokio::test]
    async fn callback_rejects_provider_error_first() {
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            code: Some("x".to_string()),
            state: None,
        };
        let err = flow(Some("abc")).callback(params).await.unwrap_err();
        assert!(matches!(err, OAuthError::Provider(ref e) if e == "access_denied"));
    }

    #[tokio::test]
    async fn callback_requires_code_and_known_state() {
        let flow = flow(Some("abc"));
        let err = flow.callback(CallbackParams::default()).await.unwrap_err();
        assert!(matches!(err, OAuthError::MissingCode));

        let params = CallbackParams {
            code: Some("x".to_string()),
            state: Some("forged".to_string()),
            error: None,
        };
        let err = flow.callback(params).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidState));
    }

    #[test]
    fn error_responses_have_expected_status() {
        assert_eq!(
            OAuthError::InvalidState.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::NotConfigured.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OAuthError::Exchange { status: 401 }.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
