//! Online/offline policy hooks.
//!
//! The session runtime doesn't know what "logged in" means for a given
//! application. A [`SessionPolicy`] answers that question: while it says
//! the client isn't online, broadcast messages wait in the session's
//! standby queue instead of going out.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use strand_protocol::MessagePtr;

/// Application-specific session state the runtime consults.
///
/// # Trait bounds
///
/// - `Send + Sync` → the input thread, the output thread, and any thread
///   posting messages all query the policy concurrently.
/// - `'static` → the policy lives inside the session for its whole life.
pub trait SessionPolicy: Send + Sync + 'static {
    /// Whether the client has finished its handshake and may receive
    /// broadcast traffic.
    fn is_client_online(&self) -> bool;

    /// Whether the client is on its way out. Posts are dropped while this
    /// is true.
    fn is_client_going_offline(&self) -> bool;

    /// Called for each standby message when the queue is flushed.
    ///
    /// Return the message (or a replacement) to send it, or `None` to drop
    /// it. The default sends every message unchanged.
    fn post_standby_message(&self, message: MessagePtr) -> Option<MessagePtr> {
        Some(message)
    }

    /// Adds policy-specific attributes to the session's diagnostic info.
    fn extend_session_info(&self, _info: &mut Map<String, Value>) {}
}

// ---------------------------------------------------------------------------
// LoginGate
// ---------------------------------------------------------------------------

/// A [`SessionPolicy`] driven by two flags.
///
/// Handlers flip the flags as the client logs in and out:
///
/// ```rust
/// use strand_session::{LoginGate, SessionPolicy};
///
/// let gate = LoginGate::new();
/// assert!(!gate.is_client_online());
/// gate.set_online(true);
/// assert!(gate.is_client_online());
/// ```
#[derive(Debug, Default)]
pub struct LoginGate {
    online: AtomicBool,
    going_offline: AtomicBool,
}

impl LoginGate {
    /// A gate whose client starts offline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate whose client is online from the start, for protocols without
    /// a login step.
    pub fn online() -> Self {
        let gate = Self::new();
        gate.set_online(true);
        gate
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn set_going_offline(&self, going_offline: bool) {
        self.going_offline.store(going_offline, Ordering::Release);
    }
}

impl SessionPolicy for LoginGate {
    fn is_client_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn is_client_going_offline(&self) -> bool {
        self.going_offline.load(Ordering::Acquire)
    }
}
