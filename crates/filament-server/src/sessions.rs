//! Session table — tracks this process's extension sessions.
//!
//! Purely observational: entries record who connected and when, for logging
//! and introspection. Protocol state lives in each session itself.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// Connection state of a tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake completed, session live.
    Connected,
    /// Transport gone; kept for post-mortem inspection.
    Disconnected,
}

/// One tracked session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// The session's connection identity.
    pub session_id: String,
    /// Identity the extension presented during the handshake.
    pub identity: String,
    /// Remote socket address, when known.
    pub address: Option<SocketAddr>,
    /// Connection state.
    pub state: SessionState,
    /// When the handshake completed.
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe table of all sessions this server has authenticated.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session after a successful handshake.
    pub fn add(&self, entry: SessionEntry) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(entry.session_id.clone(), entry);
    }

    /// Mark a session as disconnected (entry is kept).
    pub fn mark_disconnected(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.state = SessionState::Disconnected;
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    /// All sessions, connected and disconnected.
    pub fn all(&self) -> Vec<SessionEntry> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.values().cloned().collect()
    }

    /// Number of live sessions.
    pub fn connected_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .values()
            .filter(|s| s.state == SessionState::Connected)
            .count()
    }

    /// Total number of tracked sessions.
    pub fn total_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }
}
