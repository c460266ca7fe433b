//! Model Context Protocol (MCP) over WebSocket.
//!
//! Each authenticated WebSocket connection becomes a [`Session`] that feeds
//! inbound frames through the [`Dispatcher`] and writes one JSON-RPC 2.0
//! response per frame.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│  Registry   │      │
//! │   │ (websocket) │    │  (methods)  │    │   (tools)   │      │
//! │   └─────────────┘    └─────────────┘    └─────────────┘      │
//! │          │                  │                               │
//! │          ▼                  ▼                               │
//! │   ┌─────────────────────────────────────────────────┐        │
//! │   │         Envelope codec (JSON-RPC 2.0)           │        │
//! │   └─────────────────────────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use protocol::{
    EnvelopeCodec, ErrorCode, ErrorObject, RequestEnvelope, RequestId, ResponseEnvelope,
    MCP_PROTOCOL_VERSION,
};
pub use server::Dispatcher;
pub use session::{Session, SessionState};
pub use transport::{Transport, WebSocketTransport};
