//! The set of live sessions on a server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strand_protocol::MessagePtr;
use strand_transport::ConnectionId;

use crate::{ClientSession, SessionPolicy};

/// Holds a strong reference to every live session.
///
/// Sessions keep a `Weak` back-reference and remove themselves on
/// shutdown. Methods that call into sessions work on a snapshot so no
/// session code runs under the registry lock.
pub struct SessionRegistry<P: SessionPolicy> {
    name: String,
    sessions: Mutex<HashMap<ConnectionId, Arc<ClientSession<P>>>>,
}

impl<P: SessionPolicy> SessionRegistry<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, session: Arc<ClientSession<P>>) {
        tracing::debug!(registry = %self.name, session = %session.name(), "session registered");
        self.lock().insert(session.id(), session);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ClientSession<P>>> {
        let removed = self.lock().remove(&id);
        if let Some(session) = &removed {
            tracing::debug!(registry = %self.name, session = %session.name(), "session unregistered");
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ClientSession<P>>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A snapshot of the registered sessions.
    pub fn sessions(&self) -> Vec<Arc<ClientSession<P>>> {
        self.lock().values().cloned().collect()
    }

    /// Posts `message` to every session as a broadcast. Sessions whose
    /// client isn't online keep it in standby. Returns the number of
    /// sessions posted to.
    pub fn broadcast(&self, message: MessagePtr) -> usize {
        let sessions = self.sessions();
        for session in &sessions {
            session.post_broadcast_output_message(Arc::clone(&message));
        }
        sessions.len()
    }

    /// Shuts every registered session down.
    pub fn shutdown_all(&self) {
        let sessions = self.sessions();
        if !sessions.is_empty() {
            tracing::info!(registry = %self.name, count = sessions.len(), "shutting down all sessions");
        }
        for session in sessions {
            session.shutdown(None);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ClientSession<P>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: SessionPolicy> std::fmt::Debug for SessionRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("name", &self.name)
            .field("sessions", &self.len())
            .finish()
    }
}
