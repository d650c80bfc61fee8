//! The session store.
//!
//! A concurrent map from session id to session record. Each record sits
//! behind its own async mutex so a session's state machine is driven
//! message-at-a-time while unrelated sessions proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::session::Session;

/// Shared handle to one session record.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Mapping from session id to session record.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Insert a session, returning its handle. An existing record under
    /// the same id is kept (create-or-join races resolve to the first
    /// writer).
    pub fn insert(&self, session: Session) -> SessionHandle {
        let session_id = session.session_id.clone();
        let handle = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(session = %session_id, "Creating session");
                Arc::new(Mutex::new(session))
            })
            .clone();
        handle
    }

    /// Delete a session by id. Returns `true` if it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!(session = %session_id, "Deleted session");
        }
        removed
    }

    /// Snapshot of all `(id, handle)` pairs, for the cleanup ticker.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session; used on shutdown.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}
