//! whoop-mcp-gateway: authenticated MCP gateway for WHOOP fitness data
//!
//! Serves the MCP WebSocket endpoint and the side-channel HTTP routes until
//! SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use whoop_mcp_gateway::config::{self, Config};
use whoop_mcp_gateway::error::ServerError;
use whoop_mcp_gateway::http::{self, AppState};
use whoop_mcp_gateway::security::Credential;

/// Authenticated MCP gateway exposing WHOOP fitness data tools over WebSocket.
///
/// Clients connect to `/mcp` with an `X-API-Key` header and speak JSON-RPC
/// 2.0. Configuration comes from an optional JSON file, `.env` and the
/// environment.
#[derive(Parser, Debug)]
#[command(name = "whoop-mcp-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config and HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config and PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Print a generated API key to stderr once at startup
    #[arg(long)]
    show_api_key: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "info" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" | "critical" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Uses the configured key, or generates one for this process.
fn resolve_credential(cfg: &Config, show: bool) -> Credential {
    if let Some(key) = cfg.security.api_key.as_deref() {
        let credential = Credential::new(key);
        info!(api_key = %credential.masked(), "Using configured API key");
        return credential;
    }

    let credential = Credential::generate();
    warn!(
        api_key = %credential.masked(),
        "API_SECRET_KEY not set; generated a key for this process"
    );
    if show {
        eprintln!("Generated API key: {}", credential.expose());
    } else {
        warn!("Re-run with --show-api-key to print it, or set API_SECRET_KEY");
    }
    credential
}

async fn run(cfg: Config, credential: Credential) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", cfg.server.host, cfg.server.port)))?;

    let state = AppState::from_config(&cfg, credential)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    http::serve(listener, state, http::shutdown_signal()).await
}

/// Entry point for the whoop-mcp-gateway server.
fn main() -> ExitCode {
    // A missing .env is normal; variables may come from the real environment.
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig file looked up at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level, cfg.logging.format == "json");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %cfg.server.host,
        port = cfg.server.port,
        environment = %cfg.server.environment,
        "Starting whoop-mcp-gateway"
    );
    info!(
        requests = cfg.security.rate_limit_requests,
        window_secs = cfg.security.rate_limit_window_secs,
        max_message_bytes = cfg.security.max_message_bytes,
        "Security limits configured"
    );
    if cfg.whoop.client_id.is_none() {
        warn!("WHOOP_CLIENT_ID not set; /whoop/auth will be unavailable");
    }

    let credential = resolve_credential(&cfg, args.show_api_key);

    // Run the server
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, credential)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "WARNING"), Level::WARN);
        assert_eq!(get_log_level(0, false, "bogus"), Level::INFO);
    }
}
