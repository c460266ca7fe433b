//! HTTP surface: the `/mcp` WebSocket endpoint plus side-channel routes.
//!
//! | Route | Access |
//! |---|---|
//! | `GET /health`, `GET /` | public |
//! | `GET /whoop/auth`, `GET /whoop/callback` | public |
//! | `GET /tools`, `GET /auth` | `X-API-Key` |
//! | `GET /mcp` | `X-API-Key`, checked before upgrade |
//!
//! Every route passes through [`middleware::request_guard`], so upgrades
//! count against the same per-client rate window as plain requests. The
//! security headers sit outside the guard and also mark 429 responses.

pub mod handlers;
pub mod middleware;
pub mod oauth;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::config::Config;
use crate::error::ServerError;
use crate::mcp::{Dispatcher, EnvelopeCodec};
use crate::security::{AccessGuard, Credential, RateLimitPolicy, RateLimiter, API_KEY_HEADER};
use crate::tools::token::TokenStore;
use crate::tools::whoop::{register_tools, WhoopClient};
use crate::tools::ToolRegistry;
use oauth::OAuthFlow;

/// Timeout for every outbound request to WHOOP.
const UPSTREAM_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Origins accepted in production.
const PRODUCTION_ORIGIN_PREFIXES: [&str; 2] = ["https://localhost:", "https://127.0.0.1:"];

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Credential check for protected routes and upgrades.
    pub guard: Arc<AccessGuard>,
    /// Per-client request limiter.
    pub limiter: Arc<RateLimiter>,
    /// Request dispatcher shared by all sessions.
    pub dispatcher: Arc<Dispatcher>,
    /// Persisted provider token.
    pub tokens: TokenStore,
    /// OAuth state tracking.
    pub oauth: Arc<OAuthFlow>,
    /// Restricts CORS when set.
    pub production: bool,
}

impl AppState {
    /// Wires every component from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbound HTTP client cannot be built or the
    /// tool set contains duplicate names.
    pub fn from_config(config: &Config, credential: Credential) -> Result<Self, ServerError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(ServerError::HttpClient)?;

        let tokens = TokenStore::new(config.whoop.token_path());
        let client = Arc::new(WhoopClient::new(
            http.clone(),
            config.whoop.api_base.clone(),
            tokens.clone(),
        ));

        let mut builder = ToolRegistry::builder().timeout(config.security.tool_timeout());
        register_tools(&mut builder, &client)?;
        let registry = builder.build();
        tracing::info!(tools = registry.len(), "Tool registry ready");

        let codec = EnvelopeCodec::new(config.security.max_message_bytes);
        let limiter = RateLimiter::new(RateLimitPolicy {
            capacity: config.security.rate_limit_requests,
            window: config.security.rate_limit_window(),
        });

        Ok(Self {
            guard: Arc::new(AccessGuard::new(credential)),
            limiter: Arc::new(limiter),
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry), codec)),
            oauth: Arc::new(OAuthFlow::new(http, config.whoop.clone(), tokens.clone())),
            tokens,
            production: config.is_production(),
        })
    }
}

/// Builds the router with all middleware attached.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/tools", get(handlers::tools))
        .route("/auth", get(handlers::auth_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::root))
        .route("/whoop/auth", get(handlers::whoop_auth))
        .route("/whoop/callback", get(handlers::whoop_callback))
        .route("/mcp", get(handlers::mcp_websocket))
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_guard,
        ))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::X_FRAME_OPTIONS, "DENY"))
        .layer(security_header(header::X_XSS_PROTECTION, "1; mode=block"))
        .layer(security_header(
            header::STRICT_TRANSPORT_SECURITY,
            "max-age=31536000; includeSubDomains",
        ))
        .layer(security_header(
            header::CONTENT_SECURITY_POLICY,
            "default-src 'self'; frame-ancestors 'none'",
        ))
        .layer(security_header(
            header::REFERRER_POLICY,
            "strict-origin-when-cross-origin",
        ))
        .layer(cors_layer(state.production))
        .layer(
            TraceLayer::new_for_http()
                // Path only: the OAuth callback carries the grant code in its query.
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = request.uri().path(),
                        client = tracing::field::Empty,
                    )
                })
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(state)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Permissive in development; local HTTPS origins only in production.
fn cors_layer(production: bool) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if production {
        layer.allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin.to_str().is_ok_and(|o| {
                    PRODUCTION_ORIGIN_PREFIXES
                        .iter()
                        .any(|prefix| o.starts_with(prefix))
                })
            },
        ))
    } else {
        layer.allow_origin(Any)
    }
}

/// Serves until `shutdown` resolves.
///
/// Also runs the periodic sweep of idle rate windows for the lifetime of
/// the server.
///
/// # Errors
///
/// Returns an error if the listener fails while serving.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;
    let sweeper = spawn_rate_window_sweep(Arc::clone(&state.limiter));

    tracing::info!(%addr, "Listening");
    let result = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|source| ServerError::Serve { addr, source });

    sweeper.abort();
    result
}

fn spawn_rate_window_sweep(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.policy().window);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dropped = limiter.sweep();
            if dropped > 0 {
                tracing::debug!(dropped, remaining = limiter.tracked_clients(), "Swept idle rate windows");
            }
        }
    })
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::error!("Failed to install signal handlers; shutdown only by termination");
        std::future::pending::<()>().await;
        return;
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves on Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    } else {
        std::future::pending::<()>().await;
    }
}
