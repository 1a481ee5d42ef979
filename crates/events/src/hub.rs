//! Session-keyed registry of live client connections.
//!
//! [`SessionHub`] maps each session id to the outbound channel of its most
//! recent socket. It is transport-agnostic: the socket task drains
//! [`HubFrame`]s from the receiver returned by [`SessionHub::register`] and
//! writes them in whatever framing it uses.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use markswift_core::types::SessionId;
use tokio::sync::mpsc;

use crate::protocol::{Envelope, Notification};
use crate::sink::NotificationSink;

/// Outbound frame for a session connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubFrame {
    /// A serialized [`Envelope`].
    Text(String),
    /// Keep-alive probe.
    Ping,
    /// Ask the transport to close the connection.
    Close,
}

/// Channel sender half for pushing frames to a connection.
pub type HubSender = mpsc::UnboundedSender<HubFrame>;

/// Metadata for one registered connection.
struct SessionConnection {
    /// Distinguishes a reconnect from the socket it replaced.
    conn_id: String,
    sender: HubSender,
}

/// Registry of live connections, one per session.
///
/// Uses a blocking `RwLock` so [`NotificationSink::try_send`] stays
/// synchronous; every critical section is a map lookup or insert.
pub struct SessionHub {
    connections: RwLock<HashMap<SessionId, SessionConnection>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection for `session_id`, replacing any previous one.
    ///
    /// Returns the connection id (needed for [`remove`](Self::remove)) and
    /// the receiver half the transport should drain.
    pub fn register(
        &self,
        session_id: impl Into<SessionId>,
    ) -> (String, mpsc::UnboundedReceiver<HubFrame>) {
        let session_id = session_id.into();
        let conn_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                session_id.clone(),
                SessionConnection {
                    conn_id: conn_id.clone(),
                    sender: tx,
                },
            );

        if let Some(old) = previous {
            tracing::debug!(session_id = %session_id, "Replacing existing session connection");
            let _ = old.sender.send(HubFrame::Close);
        }

        (conn_id, rx)
    }

    /// Remove the session's connection if it is still `conn_id`.
    ///
    /// A socket that was replaced by a reconnect must not unregister its
    /// successor, so a mismatched id is a no-op.
    pub fn remove(&self, session_id: &str, conn_id: &str) -> bool {
        let mut conns = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match conns.get(session_id) {
            Some(conn) if conn.conn_id == conn_id => {
                conns.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Return the current number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Send a Ping frame to every registered session.
    pub fn ping_all(&self) {
        let conns = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for conn in conns.values() {
            let _ = conn.sender.send(HubFrame::Ping);
        }
    }

    /// Send a Close frame to every session, then clear the registry.
    pub fn shutdown_all(&self) {
        let mut conns = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(HubFrame::Close);
        }
        conns.clear();
        tracing::info!(count, "Closed all session connections");
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for SessionHub {
    fn try_send(&self, session_id: &str, message: &Notification) -> bool {
        self.deliver(session_id, None, message)
    }
}

impl SessionHub {
    /// Like [`NotificationSink::try_send`], but only while `conn_id` is
    /// still the session's current connection. Replies to a request use
    /// this so a replaced socket cannot answer through its successor.
    pub fn send_to_connection(
        &self,
        session_id: &str,
        conn_id: &str,
        message: &Notification,
    ) -> bool {
        self.deliver(session_id, Some(conn_id), message)
    }

    fn deliver(&self, session_id: &str, conn_id: Option<&str>, message: &Notification) -> bool {
        let payload = match Envelope::new(session_id, message).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(session_id, kind = message.kind(), error = %e, "Failed to serialize notification");
                return false;
            }
        };

        let conns = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match conns.get(session_id) {
            Some(conn) if conn_id.is_some_and(|id| id != conn.conn_id) => {
                tracing::debug!(session_id, kind = message.kind(), "Connection was replaced");
                false
            }
            Some(conn) => {
                let delivered = conn.sender.send(HubFrame::Text(payload)).is_ok();
                if !delivered {
                    tracing::debug!(session_id, kind = message.kind(), "Session channel closed");
                }
                delivered
            }
            None => {
                tracing::debug!(session_id, kind = message.kind(), "No connection for session");
                false
            }
        }
    }
}
