//! One authenticated connection's lifecycle.
//!
//! A session starts `Unauthenticated`. The credential presented on the
//! upgrade is checked exactly once; on success the session runs its frame
//! loop until the peer disconnects, then it is `Closed`. Frames within a
//! session are handled strictly one at a time, so responses go out in the
//! order requests arrived.

use std::sync::Arc;

use uuid::Uuid;

use crate::mcp::protocol::EnvelopeCodec;
use crate::mcp::server::Dispatcher;
use crate::mcp::transport::Transport;
use crate::security::{AccessGuard, ClientIdentity};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, credential not yet checked.
    Unauthenticated,
    /// Credential accepted; frames are being served.
    Authenticated,
    /// Terminal.
    Closed,
}

/// A single client connection.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    client: ClientIdentity,
    state: SessionState,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    /// Creates an unauthenticated session.
    #[must_use]
    pub fn new(client: ClientIdentity, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            state: SessionState::Unauthenticated,
            dispatcher,
        }
    }

    /// Session identifier, for log correlation only.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Checks the presented credential. Only valid while unauthenticated.
    ///
    /// A refusal closes the session.
    pub fn authenticate(&mut self, guard: &AccessGuard, presented: Option<&str>) -> bool {
        if self.state != SessionState::Unauthenticated {
            return self.state == SessionState::Authenticated;
        }

        if guard.authorize(presented) {
            self.state = SessionState::Authenticated;
            tracing::info!(session = %self.id, client = %self.client, "Session authenticated");
            true
        } else {
            self.state = SessionState::Closed;
            tracing::warn!(
                session = %self.id,
                client = %self.client,
                credential_present = presented.is_some_and(|p| !p.is_empty()),
                "Session refused: invalid credential"
            );
            false
        }
    }

    /// Serves frames until the peer disconnects or the transport fails.
    ///
    /// Transport faults are logged and end the session; they are never
    /// propagated to the caller.
    pub async fn run<T: Transport>(mut self, transport: &mut T) -> SessionState {
        if self.state != SessionState::Authenticated {
            self.state = SessionState::Closed;
            return self.state;
        }

        let mut frames: u64 = 0;
        loop {
            let frame = match transport.recv_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!(session = %self.id, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(session = %self.id, error = %e, "Receive failed");
                    break;
                }
            };
            frames += 1;

            let response = self.dispatcher.handle_frame(&frame).await;
            let text = EnvelopeCodec::encode(&response);

            if let Err(e) = transport.send_text(text).await {
                tracing::debug!(
                    session = %self.id,
                    id = %response.id,
                    error = %e,
                    "Peer gone before response was delivered"
                );
                break;
            }
        }

        self.state = SessionState::Closed;
        tracing::info!(session = %self.id, client = %self.client, frames, "Session closed");
        self.state
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::mcp::transport::memory::pair;
    use crate::security::Credential;
    use crate::tools::tests::registry;

    fn session() -> Session {
        let dispatcher = Dispatcher::new(Arc::new(registry()), EnvelopeCodec::default());
        Session::new(ClientIdentity::new("test"), Arc::new(dispatcher))
    }

    fn guard() -> AccessGuard {
        AccessGuard::new(Credential::new("key"))
    }

    #[test]
    fn wrong_credential_closes() {
        let mut session = session();
        assert!(!session.authenticate(&guard(), Some("nope")));
        assert_eq!(session.state(), SessionState::Closed);
        // A closed session cannot be revived.
        assert!(!session.authenticate(&guard(), Some("key")));
    }

    #[test]
    fn correct_credential_authenticates() {
        let mut session = session();
        assert!(session.authenticate(&guard(), Some("key")));
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn unauthenticated_session_serves_nothing() {
        let (mut transport, tx, mut rx) = pair();
        tx.send(br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.to_vec())
            .unwrap();
        let state = session().run(&mut transport).await;
        assert_eq!(state, SessionState::Closed);
        drop(transport);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn responses_follow_request_order_and_errors_do_not_end_session() {
        let (mut transport, tx, mut rx) = pair();
        let frames: [&[u8]; 4] = [
            br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            b"not json",
            br#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"broken"}}"#,
            br#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#,
        ];
        for frame in frames {
            tx.send(frame.to_vec()).unwrap();
        }
        drop(tx);

        let mut session = session();
        assert!(session.authenticate(&guard(), Some("key")));
        assert_eq!(session.run(&mut transport).await, SessionState::Closed);

        let mut responses = Vec::new();
        while let Ok(text) = rx.try_recv() {
            responses.push(serde_json::from_str::<Value>(&text).unwrap());
        }
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"].is_object());
        assert_eq!(responses[1]["id"], Value::Null);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["error"]["code"], -32603);
        assert_eq!(responses[3]["id"], 4);
        assert_eq!(responses[3]["result"]["tools"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn send_failure_ends_session_quietly() {
        let (mut transport, tx, rx) = pair();
        drop(rx);
        tx.send(br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#.to_vec())
            .unwrap();
        tx.send(br#"{"jsonrpc":"2.0","id":2,"method":"initialize"}"#.to_vec())
            .unwrap();

        let mut session = session();
        assert!(session.authenticate(&guard(), Some("key")));
        assert_eq!(session.run(&mut transport).await, SessionState::Closed);
        // The loop stopped at the first failed send.
        assert!(transport.inbound.try_recv().is_ok());
        assert!(transport.inbound.try_recv().is_err());
    }
}
