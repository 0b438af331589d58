//! Application hook for inbound messages.

use std::sync::Arc;

use strand_protocol::Message;

use crate::{ClientSession, SessionError, SessionPolicy};

/// Handles messages read by a session's input thread.
///
/// Called synchronously on the input thread, in arrival order. A handler
/// that needs to do slow work should hand it to a
/// [`WorkerPool`](crate::WorkerPool) and return, so the next message can be
/// read.
///
/// Returning an error whose [`kind`](SessionError::kind) is `State` or
/// `Range` logs it and keeps the session alive. Any other error ends the
/// session.
///
/// Any `Fn(&Arc<ClientSession<P>>, Message) -> Result<(), SessionError>`
/// closure is a handler:
///
/// ```rust
/// use std::sync::Arc;
/// use strand_protocol::Message;
/// use strand_session::{ClientSession, LoginGate, MessageHandler, SessionError};
///
/// let echo = |session: &Arc<ClientSession<LoginGate>>, message: Message| -> Result<(), SessionError> {
///     session.post_output_message(Arc::new(message), false);
///     Ok(())
/// };
/// let _handler: Arc<dyn MessageHandler<LoginGate>> = Arc::new(echo);
/// ```
pub trait MessageHandler<P: SessionPolicy>: Send + Sync + 'static {
    fn handle_message(
        &self,
        session: &Arc<ClientSession<P>>,
        message: Message,
    ) -> Result<(), SessionError>;
}

impl<P, F> MessageHandler<P> for F
where
    P: SessionPolicy,
    F: Fn(&Arc<ClientSession<P>>, Message) -> Result<(), SessionError> + Send + Sync + 'static,
{
    fn handle_message(
        &self,
        session: &Arc<ClientSession<P>>,
        message: Message,
    ) -> Result<(), SessionError> {
        self(session, message)
    }
}
