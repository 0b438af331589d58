//! The input thread: reads messages and dispatches them.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strand_protocol::{Message, MessagePool};

use crate::{ClientSession, FailureKind, MessageHandler, SessionError, SessionPolicy, ThreadRole};

/// A session's reader.
///
/// Blocks in a socket read most of the time. Stopping it means clearing
/// the running flag and closing the socket, which makes the read return.
pub struct InputThread<P: SessionPolicy> {
    name: String,
    running: AtomicBool,
    handler: Arc<dyn MessageHandler<P>>,
    pool: MessagePool,
    max_message_size: usize,
}

impl<P: SessionPolicy> InputThread<P> {
    pub(crate) fn new(
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler<P>>,
        pool: MessagePool,
        max_message_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            running: AtomicBool::new(true),
            handler,
            pool,
            max_message_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clears the running flag. The caller closes the socket to unblock a
    /// pending read.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// The thread body: read, dispatch, repeat. Always ends by shutting
    /// the session down.
    pub(crate) fn run<R: Read>(&self, session: &Arc<ClientSession<P>>, mut input: R) {
        let label = session.name();
        tracing::debug!(session = %label, thread = %self.name, "input thread started");

        while self.is_running() {
            let message = match Message::receive(&mut input, &self.pool, self.max_message_size) {
                Ok(message) => message,
                Err(_) if !self.is_running() || session.is_shutting_down() => {
                    tracing::debug!(session = %label, "input thread stopped");
                    break;
                }
                Err(e) if e.is_eof() => {
                    tracing::info!(session = %label, "client closed connection");
                    break;
                }
                Err(e) => {
                    let err = SessionError::from(e);
                    tracing::error!(session = %label, kind = ?err.kind(), error = %err, "read failed");
                    break;
                }
            };

            tracing::trace!(session = %label, kind = %message.kind(), len = message.payload().len(), "received message");

            if let Err(err) = self.handler.handle_message(session, message) {
                match err.kind() {
                    FailureKind::State | FailureKind::Range => {
                        tracing::warn!(session = %label, kind = ?err.kind(), error = %err, "message handler failed");
                    }
                    kind => {
                        tracing::error!(session = %label, ?kind, error = %err, "message handler failed, ending session");
                        break;
                    }
                }
            }
        }

        self.stop();
        tracing::debug!(session = %label, thread = %self.name, "input thread exiting");
        session.shutdown(Some(ThreadRole::Input));
    }
}

impl<P: SessionPolicy> std::fmt::Debug for InputThread<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputThread")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}
