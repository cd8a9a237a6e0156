//! Live session registry: which connected socket belongs to which username.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::WsServerMessage;

const SESSION_BUFFER: usize = 256;

/// Owned by the transport layer and handed to the notifier.
///
/// A username maps to at most one session; a newer connection replaces the
/// older one.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// username -> session id
    sessions: DashMap<String, String>,
    /// session id -> outbound queue of that socket
    outboxes: DashMap<String, mpsc::Sender<WsServerMessage>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `username` and return its id with the receiving end
    /// the socket task drains.
    pub fn register(&self, username: &str) -> (String, mpsc::Receiver<WsServerMessage>) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.outboxes.insert(session_id.clone(), tx);
        if let Some(previous) = self.sessions.insert(username.to_string(), session_id.clone()) {
            self.outboxes.remove(&previous);
        }
        (session_id, rx)
    }

    /// Close a session. A newer session for the same user is left alone.
    pub fn unregister(&self, username: &str, session_id: &str) {
        self.outboxes.remove(session_id);
        self.sessions
            .remove_if(username, |_, current| current == session_id);
    }

    pub fn session_for(&self, username: &str) -> Option<String> {
        self.sessions.get(username).map(|s| s.value().clone())
    }

    /// Queue an event for a session. Returns false when the session is gone or
    /// its queue is full; the event is dropped in that case.
    pub fn emit(&self, session_id: &str, event: WsServerMessage) -> bool {
        let Some(tx) = self.outboxes.get(session_id).map(|t| t.value().clone()) else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping live event for session {session_id}: {e}");
                false
            }
        }
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }
}
