use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::frames::ServerFrame;

/// Single-process in-memory mapping `session_id -> set of live
/// connections` (§4.H). Per-connection sends preserve send order; no
/// ordering is guaranteed across connections of the same session (§5).
#[derive(Default)]
pub struct Hub {
    sessions: DashMap<String, DashMap<String, UnboundedSender<String>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a new connection, registers it, and pushes the initial
    /// `connected` frame. Returns the connection id and the receiver the
    /// caller should forward to the socket.
    #[instrument(skip(self), fields(session_id))]
    pub fn connect(&self, session_id: &str) -> (String, UnboundedReceiver<String>) {
        let conn_id = Uuid::new_v4().to_string();
        let (tx, rx) = unbounded_channel();

        let frame = ServerFrame::Connected {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        };
        let _ = tx.send(frame.to_json());

        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(conn_id.clone(), tx);

        (conn_id, rx)
    }

    #[instrument(skip(self), fields(session_id, conn_id))]
    pub fn disconnect(&self, session_id: &str, conn_id: &str) {
        if let Some(conns) = self.sessions.get(session_id) {
            conns.remove(conn_id);
        }
        let now_empty = self.sessions.get(session_id).map(|c| c.is_empty()).unwrap_or(false);
        if now_empty {
            self.sessions.remove(session_id);
        }
    }

    /// Best-effort JSON send to every connection of one session; dead
    /// sockets are pruned.
    #[instrument(skip(self, payload), fields(session_id))]
    pub fn send_to_session(&self, session_id: &str, payload: &ServerFrame) {
        let Some(conns) = self.sessions.get(session_id) else {
            debug!(session_id, "send_to_session: no live connections");
            return;
        };
        let json = payload.to_json();
        let dead: Vec<String> = conns
            .iter()
            .filter_map(|entry| (entry.value().send(json.clone()).is_err()).then(|| entry.key().clone()))
            .collect();
        drop(conns);
        if !dead.is_empty() {
            if let Some(conns) = self.sessions.get(session_id) {
                for id in &dead {
                    conns.remove(id);
                }
            }
        }
    }

    /// Send to every connection of every session; same pruning.
    #[instrument(skip(self, payload))]
    pub fn broadcast(&self, payload: &ServerFrame) {
        let session_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for session_id in session_ids {
            self.send_to_session(&session_id, payload);
        }
    }

    pub fn connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map(|c| c.len()).unwrap_or(0)
    }
}
