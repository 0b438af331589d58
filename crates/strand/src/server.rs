//! `Server` builder and listener loop.
//!
//! This is the entry point for running a Strand server. It ties together
//! all the layers: a listener thread accepts sockets, the session factory
//! turns each into a [`ClientSession`], and the registry keeps track of
//! them until they shut down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use strand_protocol::MessagePool;
use strand_session::{
    MessageHandler, SessionConfig, SessionContext, SessionFactory, SessionPolicy, SessionRegistry,
};
use strand_transport::{ListenerSocket, Socket};

use crate::{ServerConfig, StrandError};

/// Pause after a failed accept, so a persistent error (such as running
/// out of file descriptors) doesn't spin the listener thread.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Builder for configuring and starting a Strand server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use strand::prelude::*;
///
/// let mut server = Server::<LoginGate>::builder()
///     .bind("127.0.0.1", 7070)
///     .handler(|session: &Arc<ClientSession<LoginGate>>, message: Message| -> Result<(), SessionError> {
///         session.post_output_message(message.into_ptr(), false);
///         Ok(())
///     })
///     .factory(|_: &Socket| LoginGate::online())
///     .build()?;
/// server.start()?;
/// # Ok::<(), StrandError>(())
/// ```
pub struct ServerBuilder<P: SessionPolicy> {
    config: ServerConfig,
    handler: Option<Arc<dyn MessageHandler<P>>>,
    factory: Option<Arc<dyn SessionFactory<P>>>,
    pool: Option<MessagePool>,
}

impl<P: SessionPolicy> ServerBuilder<P> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            handler: None,
            factory: None,
            pool: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address and port to listen on.
    pub fn bind(mut self, bind_address: &str, port: u16) -> Self {
        self.config.bind_address = bind_address.to_string();
        self.config.port = port;
        self
    }

    /// Sets the configuration applied to every session.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets the handler every session dispatches inbound messages to.
    pub fn handler(mut self, handler: impl MessageHandler<P>) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets the factory that creates a session for each connection.
    pub fn factory(mut self, factory: impl SessionFactory<P>) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Shares an existing buffer pool instead of creating one.
    pub fn message_pool(mut self, pool: MessagePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Binds the listening socket. The server doesn't accept connections
    /// until [`Server::start`] or [`Server::run`].
    ///
    /// # Errors
    /// [`StrandError::Config`] if the handler or factory is missing, or a
    /// transport error if binding fails.
    pub fn build(self) -> Result<Server<P>, StrandError> {
        let handler = self
            .handler
            .ok_or_else(|| StrandError::Config("no message handler set".into()))?;
        let factory = self
            .factory
            .ok_or_else(|| StrandError::Config("no session factory set".into()))?;

        let config = self.config;
        let mut listener =
            ListenerSocket::bind(&config.bind_address, config.port, Some(config.backlog))?;
        listener.set_accept_timeout(config.accept_timeout);
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(SessionRegistry::new(listener.name()));
        let mut context = SessionContext::new(
            config.session_base_name.clone(),
            config.client_type.clone(),
            config.session.clone(),
            handler,
        )
        .with_registry(&registry);
        if let Some(pool) = self.pool {
            context = context.with_pool(pool);
        }

        Ok(Server {
            name: listener.name().to_string(),
            local_addr,
            registry,
            running: Arc::new(AtomicBool::new(false)),
            pending: Some(Listener {
                socket: listener,
                factory,
                context,
            }),
            thread: None,
        })
    }
}

impl<P: SessionPolicy> Default for ServerBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// What the listener thread owns.
struct Listener<P: SessionPolicy> {
    socket: ListenerSocket,
    factory: Arc<dyn SessionFactory<P>>,
    context: SessionContext<P>,
}

/// Stops a running server from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Asks the listener loop to exit. It notices within one accept
    /// timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// A bound Strand server.
pub struct Server<P: SessionPolicy> {
    name: String,
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry<P>>,
    running: Arc<AtomicBool>,
    /// The listener, until a thread takes it.
    pending: Option<Listener<P>>,
    thread: Option<JoinHandle<()>>,
}

impl<P: SessionPolicy> Server<P> {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder<P> {
        ServerBuilder::new()
    }

    /// `listener(<bind>:<port>)`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<P>> {
        &self.registry
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Starts accepting connections on a background listener thread.
    ///
    /// # Errors
    /// [`StrandError::Config`] if the server was already started, or
    /// [`StrandError::Spawn`] if the thread can't be created.
    pub fn start(&mut self) -> Result<(), StrandError> {
        let listener = self.take_listener()?;
        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("strand-listener".to_string())
            .spawn(move || listen(listener, &registry, &running))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                StrandError::Spawn(e)
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Accepts connections on the calling thread until a [`StopHandle`]
    /// stops the server, then shuts all sessions down.
    pub fn run(mut self) -> Result<(), StrandError> {
        let listener = self.take_listener()?;
        listen(listener, &self.registry, &self.running);
        self.registry.shutdown_all();
        Ok(())
    }

    /// Stops the listener thread and shuts every session down.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!(listener = %self.name, "listener thread panicked");
            }
        }
        self.registry.shutdown_all();
    }

    fn take_listener(&mut self) -> Result<Listener<P>, StrandError> {
        let listener = self
            .pending
            .take()
            .ok_or_else(|| StrandError::Config(format!("{} already started", self.name)))?;
        self.running.store(true, Ordering::Release);
        Ok(listener)
    }
}

impl<P: SessionPolicy> Drop for Server<P> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

impl<P: SessionPolicy> std::fmt::Debug for Server<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("sessions", &self.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listener loop
// ---------------------------------------------------------------------------

fn listen<P: SessionPolicy>(listener: Listener<P>, registry: &Arc<SessionRegistry<P>>, running: &AtomicBool) {
    let name = listener.socket.name().to_string();
    tracing::info!(listener = %name, "accepting connections");

    while running.load(Ordering::Acquire) {
        match listener.socket.accept() {
            Ok(Some(socket)) => accept_session(&listener, registry, socket),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(listener = %name, error = %e, "accept failed");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    tracing::info!(listener = %name, "listener stopped");
}

fn accept_session<P: SessionPolicy>(listener: &Listener<P>, registry: &Arc<SessionRegistry<P>>, socket: Socket) {
    let id = socket.id();
    let session = match listener.factory.create_session(socket, &listener.context) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(listener = %listener.socket.name(), %id, error = %e, "session not created");
            return;
        }
    };

    // Registered before the threads start, so a session that ends at once
    // still finds itself in the registry to leave.
    registry.add(Arc::clone(&session));
    if let Err(e) = session.init_io_threads() {
        tracing::error!(session = %session.name(), error = %e, "cannot start session");
        session.shutdown(None);
    }
}
