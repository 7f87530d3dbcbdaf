use std::sync::Arc;

use busram_protocol::SessionId;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::{Session, SessionChannels};
use crate::mcp::{McpError, ProtocolState};
use crate::observability::Metrics;

/// Session id to live session
///
/// Thread-safe for concurrent access from stream and POST tasks. Every
/// session's cancel token is a child of the registry's, so `shutdown` stops
/// all run loops at once.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    root: CancellationToken,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            root: CancellationToken::new(),
        }
    }

    /// Register a session under `requested`, or a fresh id if none
    ///
    /// Fails with `SessionConflict` if the id is already bound.
    pub fn create(
        &self,
        requested: Option<SessionId>,
    ) -> Result<(Arc<Session>, SessionChannels), McpError> {
        if self.is_shutting_down() {
            return Err(McpError::Internal("server is shutting down".into()));
        }

        let id = requested.unwrap_or_else(SessionId::mint);
        let (session, channels) = match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                // A closed session keeps its entry until its stream task
                // releases it; the id is free for a reconnect already.
                if slot.get().state() != ProtocolState::Closed {
                    return Err(McpError::SessionConflict(id.to_string()));
                }
                let (session, channels) = self.open(&id);
                slot.insert(Arc::clone(&session));
                Metrics::global().record_session_closed();
                debug!(session = %id, "replaced closed session");
                (session, channels)
            }
            Entry::Vacant(slot) => {
                let (session, channels) = self.open(&id);
                slot.insert(Arc::clone(&session));
                (session, channels)
            }
        };

        Metrics::global().record_session_opened();
        info!(session = %id, "session created");
        Ok((session, channels))
    }

    fn open(&self, id: &SessionId) -> (Arc<Session>, SessionChannels) {
        let (session, channels) = Session::new(id.clone(), self.root.child_token());
        (Arc::new(session), channels)
    }

    /// Live session for `id`
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>, McpError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| session.state() != ProtocolState::Closed)
            .ok_or_else(|| McpError::SessionNotFound(id.to_string()))
    }

    /// Remove and close the session for `id`; no-op if absent
    pub fn destroy(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.close();
                Metrics::global().record_session_closed();
                info!(session = %id, "session destroyed");
                true
            }
            None => {
                debug!(session = %id, "destroy on absent session");
                false
            }
        }
    }

    /// Remove exactly this session
    ///
    /// Leaves the entry alone if the id has since been bound to a newer
    /// session.
    pub fn release(&self, session: &Arc<Session>) -> bool {
        session.close();
        let removed = self
            .sessions
            .remove_if(session.id(), |_, current| Arc::ptr_eq(current, session))
            .is_some();

        if removed {
            Metrics::global().record_session_closed();
            let age = Utc::now() - session.created_at();
            info!(
                session = %session.id(),
                cursor = session.inbound_cursor(),
                age_secs = age.num_seconds(),
                "session released"
            );
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel every session
    ///
    /// Run loops notice and release their own entries.
    pub fn shutdown(&self) {
        info!(sessions = self.count(), "closing all sessions");
        self.root.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
