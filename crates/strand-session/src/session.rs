//! The client session: one connected peer and its pair of threads.
//!
//! A [`ClientSession`] owns the socket, an [`InputThread`], and usually a
//! [`MessageOutputThread`]. It always lives in an `Arc` because both
//! threads call back into it, and it must not go away while either thread
//! is still running.
//!
//! # Two-phase start
//!
//! ```text
//! ClientSession::new() ──→ init_io_threads() ──→ ... ──→ shutdown()
//!   (no threads yet)        (threads take Arcs)           (threads exit,
//!                                                          drop their Arcs)
//! ```
//!
//! A thread needs an `Arc<ClientSession>`, and there is no `Arc` until
//! construction has finished, so construction can't start the threads.
//! Whoever creates a session must call
//! [`init_io_threads`](ClientSession::init_io_threads) before any I/O
//! happens. The session is dropped when the last `Arc` goes, normally when
//! the second of its threads exits after shutdown.
//!
//! # Standby
//!
//! A session can exist before its client has logged in. While the policy
//! reports the client offline, broadcast posts are kept in a standby queue
//! and sent, in order, by
//! [`move_standby_messages_to_output_queue`](ClientSession::move_standby_messages_to_output_queue)
//! once it comes online. A client that never gets there is cut off by the
//! standby time limit.
//!
//! The routing decision for a broadcast is made under the session mutex.
//! While the standby queue is non-empty or being flushed, new broadcasts
//! are appended behind it even if the client already reports online, so a
//! broadcast can neither overtake nor miss a flush.
//! [`bring_client_online`](ClientSession::bring_client_online) flips the
//! policy and flushes in one call.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Instant;

use serde_json::{Map, Value, json};
use strand_protocol::{Message, MessagePtr};
use strand_transport::{ConnectionId, Socket, SocketStream};

use crate::{
    InputThread, MessageOutputThread, SessionConfig, SessionContext, SessionError, SessionPolicy,
    SessionRegistry,
};

/// Which of a session's threads is calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Input,
    Output,
}

impl fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// State guarded by the session mutex.
#[derive(Debug, Default)]
struct Standby {
    messages: VecDeque<MessagePtr>,
    /// When the first message of the current standby period was posted.
    since: Option<Instant>,
    /// Set while a flush is handing messages to the output side. Broadcasts
    /// keep landing in `messages` until it clears.
    flushing: bool,
}

/// One connected client.
pub struct ClientSession<P: SessionPolicy> {
    id: ConnectionId,
    name: String,
    client_type: String,
    client_address: String,
    config: SessionConfig,
    policy: P,
    socket: Arc<Socket>,
    registry: Weak<SessionRegistry<P>>,
    input: InputThread<P>,
    output: Option<MessageOutputThread>,
    shutting_down: AtomicBool,
    io_started: AtomicBool,
    standby: Mutex<Standby>,
    created: Instant,
}

impl<P: SessionPolicy> ClientSession<P> {
    /// Creates a session for an accepted socket. No thread runs yet; call
    /// [`init_io_threads`](Self::init_io_threads) next.
    ///
    /// The session is named `<base_name>:<peer ip>:<peer port>`, and that
    /// name labels every log event its threads emit.
    ///
    /// # Errors
    /// Fails if the socket's peer address can't be read.
    pub fn new(socket: Socket, policy: P, context: &SessionContext<P>) -> Result<Arc<Self>, SessionError> {
        let peer = socket.peer_addr()?;
        let name = format!("{}:{}:{}", context.base_name, peer.ip(), peer.port());
        let config = context.config.clone();

        if let Some(timeout) = config.read_timeout {
            socket.set_read_timeout(timeout);
        }
        if let Some(timeout) = config.write_timeout {
            socket.set_write_timeout(timeout);
        }

        let input = InputThread::new(
            format!("{name}/in"),
            Arc::clone(&context.handler),
            context.pool.clone(),
            config.max_message_size,
        );
        let output = config
            .use_output_thread
            .then(|| MessageOutputThread::new(format!("{name}/out"), &config));

        tracing::info!(session = %name, client_type = %context.client_type, id = %socket.id(), "session created");

        Ok(Arc::new(Self {
            id: socket.id(),
            name,
            client_type: context.client_type.clone(),
            client_address: peer.ip().to_string(),
            config,
            policy,
            socket: Arc::new(socket),
            registry: context.registry.clone(),
            input,
            output,
            shutting_down: AtomicBool::new(false),
            io_started: AtomicBool::new(false),
            standby: Mutex::new(Standby::default()),
            created: Instant::now(),
        }))
    }

    /// Starts the input thread and, if configured, the output thread.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyInitialized`] on a second call.
    /// - [`SessionError::ShuttingDown`] if the session was already shut down.
    /// - [`SessionError::Spawn`] if a thread can't be started. The session
    ///   is shut down in that case.
    pub fn init_io_threads(self: &Arc<Self>) -> Result<(), SessionError> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown(self.name.clone()));
        }
        if self.io_started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyInitialized(self.name.clone()));
        }

        let reader = SocketStream::new(Arc::clone(&self.socket), self.input.name());
        let session = Arc::clone(self);
        thread::Builder::new()
            .name(self.input.name().to_owned())
            .spawn(move || session.input.run(&session, reader))
            .map_err(|e| self.abort_start("input thread", e))?;

        if let Some(output) = &self.output {
            let writer = SocketStream::new(Arc::clone(&self.socket), output.name());
            let session = Arc::clone(self);
            thread::Builder::new()
                .name(output.name().to_owned())
                .spawn(move || {
                    if let Some(output) = &session.output {
                        output.run(&session, writer);
                    }
                })
                .map_err(|e| self.abort_start("output thread", e))?;
        }

        tracing::debug!(session = %self.name, output_thread = self.output.is_some(), "i/o threads started");
        Ok(())
    }

    fn abort_start(&self, what: &str, source: io::Error) -> SessionError {
        tracing::error!(session = %self.name, error = %source, "cannot start {what}");
        self.shutdown(None);
        SessionError::Spawn {
            what: format!("{what} for {}", self.name),
            source,
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Sends `message` to the client, or buffers it.
    ///
    /// - Dropped if the session is shutting down or the client is going
    ///   offline.
    /// - Kept in the standby queue if `for_broadcast` and the client isn't
    ///   online yet, or earlier broadcasts are still waiting there.
    /// - Otherwise queued on the output thread, subject to its limits, or
    ///   written right away when the session has no output thread.
    ///
    /// Backpressure never surfaces as an error. A post that pushes the
    /// output queue past its grace period shuts the session down instead.
    pub fn post_output_message(&self, message: MessagePtr, for_broadcast: bool) {
        if self.is_shutting_down() {
            tracing::debug!(session = %self.name, kind = %message.kind(), "session shutting down, message dropped");
            return;
        }
        if self.policy.is_client_going_offline() {
            tracing::debug!(session = %self.name, kind = %message.kind(), "client going offline, message dropped");
            return;
        }
        if for_broadcast {
            let standby = self.lock_standby();
            if standby.flushing || !standby.messages.is_empty() || !self.policy.is_client_online() {
                self.post_standby_message(standby, message);
                return;
            }
        }
        self.forward(message, true);
    }

    /// Shorthand for `post_output_message(message, true)`.
    pub fn post_broadcast_output_message(&self, message: MessagePtr) {
        self.post_output_message(message, true);
    }

    fn forward(&self, message: MessagePtr, respect_limits: bool) {
        match &self.output {
            Some(output) => {
                if !output.post_output_message(message, respect_limits) && !output.is_running() {
                    self.shutdown(None);
                }
            }
            None => {
                let mut out = SocketStream::new(Arc::clone(&self.socket), self.name.as_str());
                self.send_message_to_client(&message, &self.name, &mut out);
            }
        }
    }

    fn post_standby_message(&self, mut standby: MutexGuard<'_, Standby>, message: MessagePtr) {
        let now = Instant::now();
        let since = *standby.since.get_or_insert(now);

        let limit = self.config.standby_time_limit;
        if !standby.flushing && !limit.is_zero() && now.duration_since(since) > limit {
            let queued = standby.messages.len();
            drop(standby);
            tracing::error!(
                session = %self.name,
                queued,
                limit = ?limit,
                "standby time limit exceeded, client never came online"
            );
            self.shutdown(None);
            return;
        }

        if let Err(e) = standby.messages.try_reserve(1) {
            drop(standby);
            tracing::error!(session = %self.name, error = %e, "cannot grow standby queue");
            self.shutdown(None);
            return;
        }
        standby.messages.push_back(message);
    }

    /// Sends everything buffered while the client was offline.
    ///
    /// Call this right after the policy starts reporting the client
    /// online. Each message passes through
    /// [`SessionPolicy::post_standby_message`] first and is queued without
    /// applying the output limits.
    ///
    /// Broadcasts posted while the flush runs are queued behind the batch
    /// being sent and go out in the same call. If another thread is already
    /// flushing, this returns at once and that thread sends everything.
    pub fn move_standby_messages_to_output_queue(&self) {
        let mut flushed = 0usize;
        loop {
            let pending = {
                let mut standby = self.lock_standby();
                if flushed == 0 && standby.flushing {
                    return;
                }
                if standby.messages.is_empty() {
                    standby.flushing = false;
                    standby.since = None;
                    break;
                }
                standby.flushing = true;
                std::mem::take(&mut standby.messages)
            };

            flushed += pending.len();
            for message in pending {
                if self.is_shutting_down() {
                    return;
                }
                if let Some(message) = self.policy.post_standby_message(message) {
                    self.forward(message, false);
                }
            }
        }

        if flushed > 0 {
            tracing::debug!(session = %self.name, count = flushed, "flushed standby messages");
        }
    }

    /// Runs `flip` under the session mutex, then flushes the standby queue.
    ///
    /// `flip` is where the policy starts reporting the client online. No
    /// broadcast is routed while it runs. It must not post to this session.
    pub fn bring_client_online(&self, flip: impl FnOnce(&P)) {
        {
            let _standby = self.lock_standby();
            flip(&self.policy);
        }
        self.move_standby_messages_to_output_queue();
    }

    /// Writes one message to the client while holding the session mutex.
    ///
    /// Does nothing if the session is shutting down. A write failure shuts
    /// the session down. Must not be called with the session mutex held.
    pub fn send_message_to_client<W: Write + ?Sized>(&self, message: &Message, label: &str, out: &mut W) {
        let guard = self.lock_standby();
        if self.is_shutting_down() {
            tracing::debug!(session = %self.name, label, kind = %message.kind(), "session shutting down, not sending");
            return;
        }
        let result = message.send(label, out);
        drop(guard);

        if let Err(e) = result {
            let err = SessionError::from(e);
            if self.is_shutting_down() {
                tracing::debug!(session = %self.name, label, error = %err, "send failed during shutdown");
            } else {
                tracing::warn!(session = %self.name, label, kind = ?err.kind(), error = %err, "send failed, shutting down session");
            }
            self.shutdown(None);
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Tears the session down. Safe to call any number of times from any
    /// thread, including the session's own threads.
    ///
    /// Closes the socket first so a thread blocked in a read or write
    /// returns, then stops both threads, drops all buffered messages, and
    /// leaves the registry. The session itself is freed later, when the
    /// threads drop their references.
    pub fn shutdown(&self, calling_thread: Option<ThreadRole>) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        match calling_thread {
            Some(role) => tracing::info!(session = %self.name, thread = %role, "session shutting down"),
            None => tracing::info!(session = %self.name, "session shutting down"),
        }

        self.socket.close();
        self.input.stop();
        if let Some(output) = &self.output {
            output.stop();
        }

        let released = {
            let mut standby = self.lock_standby();
            standby.since = None;
            standby.flushing = false;
            std::mem::take(&mut standby.messages)
        };
        drop(released);
        if let Some(output) = &self.output {
            output.release_all_queued_messages();
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_client_online(&self) -> bool {
        self.policy.is_client_online()
    }

    pub fn is_client_going_offline(&self) -> bool {
        self.policy.is_client_going_offline()
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// `<base_name>:<peer ip>:<peer port>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    /// The peer's IP address as text.
    pub fn client_address(&self) -> &str {
        &self.client_address
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The registry this session belongs to, if it is still alive.
    pub fn registry(&self) -> Option<Arc<SessionRegistry<P>>> {
        self.registry.upgrade()
    }

    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    pub fn has_output_thread(&self) -> bool {
        self.output.is_some()
    }

    pub fn output_thread(&self) -> Option<&MessageOutputThread> {
        self.output.as_ref()
    }

    pub fn input_thread(&self) -> &InputThread<P> {
        &self.input
    }

    pub fn output_queue_size(&self) -> usize {
        self.output.as_ref().map_or(0, MessageOutputThread::queue_size)
    }

    pub fn standby_queue_size(&self) -> usize {
        self.lock_standby().messages.len()
    }

    /// Diagnostic snapshot of the session as a JSON object.
    pub fn session_info(&self) -> Value {
        let (standby_size, standby_age_ms) = {
            let standby = self.lock_standby();
            (
                standby.messages.len(),
                standby.since.map(|since| since.elapsed().as_millis() as u64),
            )
        };

        let mut info = Map::new();
        info.insert("id".into(), json!(self.id.to_string()));
        info.insert("name".into(), json!(self.name));
        info.insert("client_type".into(), json!(self.client_type));
        info.insert("client_address".into(), json!(self.client_address));
        info.insert("online".into(), json!(self.is_client_online()));
        info.insert("going_offline".into(), json!(self.is_client_going_offline()));
        info.insert("shutting_down".into(), json!(self.is_shutting_down()));
        info.insert("age_ms".into(), json!(self.created.elapsed().as_millis() as u64));
        info.insert("idle_ms".into(), json!(self.socket.idle_time().as_millis() as u64));
        info.insert("bytes_read".into(), json!(self.socket.bytes_read()));
        info.insert("bytes_written".into(), json!(self.socket.bytes_written()));
        info.insert("standby_queue_size".into(), json!(standby_size));
        info.insert("standby_age_ms".into(), json!(standby_age_ms));
        if let Some(output) = &self.output {
            info.insert(
                "output".into(),
                json!({
                    "running": output.is_running(),
                    "queue_size": output.queue_size(),
                    "queue_data_size": output.queue_data_size(),
                    "warnings": output.warning_count(),
                }),
            );
        }
        self.policy.extend_session_info(&mut info);
        Value::Object(info)
    }

    fn lock_standby(&self) -> MutexGuard<'_, Standby> {
        self.standby.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: SessionPolicy> fmt::Debug for ClientSession<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("client_type", &self.client_type)
            .field("shutting_down", &self.is_shutting_down())
            .field("has_output_thread", &self.has_output_thread())
            .finish_non_exhaustive()
    }
}

impl<P: SessionPolicy> Drop for ClientSession<P> {
    fn drop(&mut self) {
        tracing::debug!(session = %self.name, "session destroyed");
    }
}
