//! Route handlers.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};

use super::middleware::unauthorized;
use super::oauth::CallbackParams;
use super::AppState;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::{Session, WebSocketTransport};
use crate::security::{presented_credential, ClientIdentity};

/// Paths that require `X-API-Key`.
pub const PROTECTED_PATHS: [&str; 3] = ["/mcp", "/tools", "/auth"];

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": SERVER_NAME }))
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let policy = state.limiter.policy();
    Json(json!({
        "name": "WHOOP MCP Server",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "security": {
            "protected_endpoints": PROTECTED_PATHS,
            "authentication": "X-API-Key header required for protected endpoints",
            "rate_limit": format!(
                "{} requests per {} seconds",
                policy.capacity,
                policy.window.as_secs()
            ),
        },
        "endpoints": {
            "health": "/health (public)",
            "mcp_ws": "/mcp (protected - requires X-API-Key)",
            "tools": "/tools (protected - requires X-API-Key)",
            "auth": "/auth (protected - requires X-API-Key)",
            "whoop_auth": "/whoop/auth (public)",
        },
    }))
}

/// `GET /tools`
pub async fn tools(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = state
        .dispatcher
        .registry()
        .list()
        .into_iter()
        .map(|d| json!({ "name": d.name, "description": d.description }))
        .collect();
    Json(json!({ "tools": tools }))
}

/// `GET /auth`
pub async fn auth_status(State(state): State<AppState>) -> Json<Value> {
    match state.tokens.load().await {
        Ok(Some(token)) => Json(json!({
            "authenticated": true,
            "token_type": token.token_type.as_deref().unwrap_or("unknown"),
            "expires_in": token.expires_in,
        })),
        Ok(None) => Json(json!({ "authenticated": false })),
        Err(e) => {
            tracing::warn!(error = %e, "Token file unreadable");
            Json(json!({ "authenticated": false }))
        }
    }
}

/// `GET /whoop/auth`
pub async fn whoop_auth(State(state): State<AppState>) -> Response {
    match state.oauth.start() {
        Ok(start) => Json(start).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cannot start OAuth flow");
            e.into_response()
        }
    }
}

/// `GET /whoop/callback`
pub async fn whoop_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.oauth.callback(params).await {
        Ok(done) => Json(done).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /mcp`
///
/// The credential is checked before the upgrade is accepted, so a refused
/// client gets a plain 401 and never an open socket.
pub async fn mcp_websocket(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let mut session = Session::new(client, Arc::clone(&state.dispatcher));
    if !session.authenticate(&state.guard, presented_credential(&headers)) {
        return unauthorized();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(session = %session.id(), error = %rejection, "Not a WebSocket upgrade");
            return rejection.into_response();
        }
    };

    upgrade.on_upgrade(move |socket| async move {
        let mut transport = WebSocketTransport::new(socket);
        session.run(&mut transport).await;
    })
}
