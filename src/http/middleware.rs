//! Request middleware shared by every route.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::security::ClientIdentity;

/// Body of every 401 response.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized. Valid X-API-Key header required.";

/// Body of every 429 response.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// The 401 response used by every protected route.
#[must_use]
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": UNAUTHORIZED_MESSAGE })),
    )
        .into_response()
}

fn rate_limited() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": RATE_LIMITED_MESSAGE })),
    )
        .into_response()
}

/// Derives the client identity and applies the rate limit.
///
/// Inserts the [`ClientIdentity`] into request extensions for handlers.
pub async fn request_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientIdentity::from_request(request.headers(), peer);

    if state.limiter.is_limited(&client) {
        tracing::warn!(%client, path = request.uri().path(), "Rate limit exceeded");
        return rate_limited();
    }
    tracing::Span::current().record("client", tracing::field::display(&client));
    request.extensions_mut().insert(client);
    next.run(request).await
}

/// Rejects requests without a valid `X-API-Key`.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.guard.authorize_headers(request.headers()) {
        return next.run(request).await;
    }
    let client = request
        .extensions()
        .get::<ClientIdentity>()
        .map_or("unknown", ClientIdentity::as_str);
    tracing::warn!(client, path = request.uri().path(), "Unauthorized request");
    unauthorized()
}
