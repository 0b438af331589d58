use std::io;
use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Resolving or connecting to a remote host failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Binding or listening on a local address failed.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// Setting or querying a socket option failed.
    #[error("socket option {option} failed: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    /// A read or write timeout elapsed before the socket became ready.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The peer closed the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl TransportError {
    /// Returns `true` if the peer closed the connection.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }

    /// Returns `true` if a read or write timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Lets transport errors travel through `std::io::Read`/`Write` adapters.
///
/// The `io::ErrorKind` is chosen so that generic readers see end-of-file
/// and timeouts the way they would on a plain `TcpStream`.
impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::ConnectionClosed(_) => io::ErrorKind::UnexpectedEof,
            TransportError::Timeout { .. } => io::ErrorKind::TimedOut,
            TransportError::ConnectFailed { source, .. }
            | TransportError::BindFailed { source, .. }
            | TransportError::SocketOption { source, .. }
            | TransportError::AcceptFailed(source)
            | TransportError::SendFailed(source)
            | TransportError::ReceiveFailed(source) => source.kind(),
        };
        io::Error::new(kind, err)
    }
}
