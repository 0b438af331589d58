//! Session creation for accepted connections.

use std::sync::{Arc, Weak};

use strand_protocol::MessagePool;
use strand_transport::Socket;

use crate::{ClientSession, MessageHandler, SessionConfig, SessionError, SessionPolicy, SessionRegistry};

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Everything a server shares between the sessions it creates.
pub struct SessionContext<P: SessionPolicy> {
    /// First part of every session name.
    pub base_name: String,
    /// Free-form tag describing what kind of client connects here.
    pub client_type: String,
    pub config: SessionConfig,
    pub handler: Arc<dyn MessageHandler<P>>,
    /// Pool for inbound message buffers.
    pub pool: MessagePool,
    /// Registry sessions remove themselves from on shutdown.
    pub registry: Weak<SessionRegistry<P>>,
}

impl<P: SessionPolicy> SessionContext<P> {
    /// A context with a fresh pool and no registry.
    pub fn new(
        base_name: impl Into<String>,
        client_type: impl Into<String>,
        config: SessionConfig,
        handler: Arc<dyn MessageHandler<P>>,
    ) -> Self {
        let base_name = base_name.into();
        Self {
            pool: MessagePool::new(format!("{base_name}-pool"), strand_protocol::DEFAULT_MAX_POOLED),
            base_name,
            client_type: client_type.into(),
            config,
            handler,
            registry: Weak::new(),
        }
    }

    pub fn with_pool(mut self, pool: MessagePool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_registry(mut self, registry: &Arc<SessionRegistry<P>>) -> Self {
        self.registry = Arc::downgrade(registry);
        self
    }
}

impl<P: SessionPolicy> Clone for SessionContext<P> {
    fn clone(&self) -> Self {
        Self {
            base_name: self.base_name.clone(),
            client_type: self.client_type.clone(),
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
            pool: self.pool.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<P: SessionPolicy> std::fmt::Debug for SessionContext<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("base_name", &self.base_name)
            .field("client_type", &self.client_type)
            .field("config", &self.config)
            .field("pool", &self.pool.name())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SessionFactory
// ---------------------------------------------------------------------------

/// Turns an accepted socket into a session.
///
/// The listener calls this for every connection, then starts the
/// session's threads and adds it to the registry. Implement it to pick a
/// policy per connection, or to reject a connection by returning an
/// error (the socket is dropped).
///
/// Any `Fn(&Socket) -> P` closure is a factory that builds a plain
/// session with the policy it returns.
pub trait SessionFactory<P: SessionPolicy>: Send + Sync + 'static {
    fn create_session(
        &self,
        socket: Socket,
        context: &SessionContext<P>,
    ) -> Result<Arc<ClientSession<P>>, SessionError>;
}

impl<P, F> SessionFactory<P> for F
where
    P: SessionPolicy,
    F: Fn(&Socket) -> P + Send + Sync + 'static,
{
    fn create_session(
        &self,
        socket: Socket,
        context: &SessionContext<P>,
    ) -> Result<Arc<ClientSession<P>>, SessionError> {
        let policy = self(&socket);
        ClientSession::new(socket, policy, context)
    }
}
