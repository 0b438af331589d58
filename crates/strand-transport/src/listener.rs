//! Listening socket with a bounded accept wait.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

use crate::sys::{self, Interest};
use crate::{Socket, TransportError};

/// Backlog used when the caller doesn't specify one.
pub const DEFAULT_BACKLOG: i32 = 50;

/// How long [`ListenerSocket::accept`] waits for a connection before
/// returning `Ok(None)`, so the owning thread can check its running flag.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns freshly accepted streams into [`Socket`]s.
///
/// Implement this to apply custom socket options to every accepted
/// connection.
pub trait SocketFactory: Send + Sync + 'static {
    fn create_socket(&self, stream: TcpStream) -> Result<Socket, TransportError>;
}

/// Wraps the stream and applies [`Socket::set_default_sock_opt`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSocketFactory;

impl SocketFactory for DefaultSocketFactory {
    fn create_socket(&self, stream: TcpStream) -> Result<Socket, TransportError> {
        let socket = Socket::from_stream(stream)?;
        socket.set_default_sock_opt()?;
        Ok(socket)
    }
}

/// A bound, listening TCP socket.
pub struct ListenerSocket<F: SocketFactory = DefaultSocketFactory> {
    listener: TcpListener,
    name: String,
    backlog: i32,
    accept_timeout: Duration,
    factory: F,
}

impl ListenerSocket<DefaultSocketFactory> {
    /// Binds and listens on `bind_address:port` with the default factory.
    ///
    /// Port 0 asks the OS for an ephemeral port; see [`Self::local_addr`].
    pub fn bind(
        bind_address: &str,
        port: u16,
        backlog: Option<i32>,
    ) -> Result<Self, TransportError> {
        Self::bind_with_factory(bind_address, port, backlog, DefaultSocketFactory)
    }
}

impl<F: SocketFactory> ListenerSocket<F> {
    /// Binds and listens, handing accepted streams to `factory`.
    pub fn bind_with_factory(
        bind_address: &str,
        port: u16,
        backlog: Option<i32>,
        factory: F,
    ) -> Result<Self, TransportError> {
        let addr = format!("{bind_address}:{port}");
        let bind_err = |source| TransportError::BindFailed {
            addr: addr.clone(),
            source,
        };

        let listener = TcpListener::bind((bind_address, port)).map_err(bind_err)?;
        let backlog = backlog.unwrap_or(DEFAULT_BACKLOG);
        sys::listen(listener.as_raw_fd(), backlog).map_err(bind_err)?;
        // Non-blocking so a connection that vanishes between poll and
        // accept can't wedge the accept loop.
        listener.set_nonblocking(true).map_err(bind_err)?;

        let name = format!("listener({addr})");
        tracing::info!(listener = %name, backlog, "listening");

        Ok(Self {
            listener,
            name,
            backlog,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            factory,
        })
    }

    /// `listener(<bind>:<port>)`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(|source| TransportError::SocketOption {
                option: "local_addr",
                source,
            })
    }

    pub fn accept_timeout(&self) -> Duration {
        self.accept_timeout
    }

    /// Changes how long each [`accept`](Self::accept) call waits.
    pub fn set_accept_timeout(&mut self, timeout: Duration) {
        self.accept_timeout = timeout;
    }

    /// Waits up to the accept timeout for a connection.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    pub fn accept(&self) -> Result<Option<Socket>, TransportError> {
        let ready = sys::wait_ready(
            self.listener.as_raw_fd(),
            Interest::Read,
            self.accept_timeout,
        )
        .map_err(TransportError::AcceptFailed)?;
        if !ready {
            return Ok(None);
        }

        match self.listener.accept() {
            Ok((stream, peer)) => {
                // Some platforms let accepted sockets inherit O_NONBLOCK.
                stream
                    .set_nonblocking(false)
                    .map_err(TransportError::AcceptFailed)?;
                tracing::debug!(listener = %self.name, %peer, "accepted connection");
                self.factory.create_socket(stream).map(Some)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::AcceptFailed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_name_uses_bind_address_and_port() {
        let listener = ListenerSocket::bind("127.0.0.1", 0, None).unwrap();
        assert_eq!(listener.name(), "listener(127.0.0.1:0)");
        assert_eq!(listener.backlog(), DEFAULT_BACKLOG);
        assert_eq!(listener.accept_timeout(), DEFAULT_ACCEPT_TIMEOUT);
    }

    #[test]
    fn test_accept_returns_none_when_idle() {
        let mut listener = ListenerSocket::bind("127.0.0.1", 0, Some(4)).unwrap();
        listener.set_accept_timeout(Duration::from_millis(50));

        let start = Instant::now();
        assert!(listener.accept().unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_accept_wraps_connection() {
        let mut listener = ListenerSocket::bind("127.0.0.1", 0, None).unwrap();
        listener.set_accept_timeout(Duration::from_secs(2));
        let port = listener.local_addr().unwrap().port();

        let client = Socket::connect("127.0.0.1", port).unwrap();
        let accepted = listener.accept().unwrap().expect("connection");
        assert_eq!(
            accepted.port_number(),
            client.local_addr().unwrap().port()
        );
    }

    #[test]
    fn test_bind_conflict_is_bind_failed() {
        let first = ListenerSocket::bind("127.0.0.1", 0, None).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = ListenerSocket::bind("127.0.0.1", port, None)
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, TransportError::BindFailed { .. }));
    }
}
