//! Frame transports for MCP sessions.
//!
//! A session only needs two operations: receive the next inbound frame and
//! send one outbound text frame. [`WebSocketTransport`] provides them over an
//! upgraded axum WebSocket:
//!
//! - Text and binary messages are both treated as frames
//! - Ping/pong are answered by the WebSocket layer and skipped here
//! - A close message or end of stream ends the session

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use thiserror::Error;

/// A transport-level fault. Fatal to the session, never sent as an envelope.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Receiving from the peer failed.
    #[error("failed to receive frame")]
    Receive(#[source] axum::Error),

    /// Sending to the peer failed (usually: the peer went away).
    #[error("failed to send frame")]
    Send(#[source] axum::Error),

    /// The peer side of an in-process transport was dropped.
    #[error("transport closed")]
    Closed,
}

/// Bidirectional frame channel owned by one session.
#[async_trait]
pub trait Transport: Send {
    /// Receives the next frame. `Ok(None)` means the peer closed cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error on an unrecoverable transport fault.
    async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer can no longer be reached.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// A transport over an upgraded WebSocket.
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    /// Wraps an upgraded socket.
    #[must_use]
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.socket.recv().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => return Err(TransportError::Receive(e)),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(TransportError::Send)
    }
}

/// In-memory transport for driving sessions in tests.
#[cfg(test)]
pub(crate) mod memory {
    use tokio::sync::mpsc;

    use super::{async_trait, Transport, TransportError};

    pub struct MemoryTransport {
        pub inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        pub outbound: mpsc::UnboundedSender<String>,
    }

    /// Returns the transport plus the client's ends of both channels.
    pub fn pair() -> (
        MemoryTransport,
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                inbound: in_rx,
                outbound: out_tx,
            },
            in_tx,
            out_rx,
        )
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.inbound.recv().await)
        }

        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound.send(text).map_err(|_| TransportError::Closed)
        }
    }
}
