//! whoop-mcp-gateway: authenticated MCP gateway for WHOOP fitness data
//!
//! This library exposes a fixed set of WHOOP data tools to AI assistants
//! through the Model Context Protocol, spoken as JSON-RPC 2.0 over a
//! WebSocket.
//!
//! # Architecture
//!
//! Every connection passes two checks before any frame is read:
//!
//! - **Rate limiting**: a sliding window per client, applied to every HTTP
//!   request including the WebSocket upgrade
//! - **Access guard**: the `X-API-Key` header must match the process-wide
//!   shared secret
//!
//! An accepted connection becomes a session that decodes each frame,
//! dispatches it and writes exactly one response, in arrival order.
//! Failures of any kind become JSON-RPC error responses; none end the
//! session.
//!
//! # Modules
//!
//! - [`config`]: configuration loading and validation
//! - [`error`]: error types
//! - [`http`]: router, middleware and side-channel endpoints
//! - [`mcp`]: envelope codec, dispatcher and session loop
//! - [`security`]: access guard, client identity and rate limiter
//! - [`tools`]: tool registry and the WHOOP tool set

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod security;
pub mod tools;
