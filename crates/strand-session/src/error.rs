//! Error types for the session layer.
//!
//! [`SessionError`] wraps failures from the layers below and adds the
//! session's own state errors. Threads don't match on variants; they ask
//! [`SessionError::kind`] which [`FailureKind`] an error belongs to and
//! decide from that whether to keep going.

use std::io;

use strand_protocol::ProtocolError;
use strand_transport::TransportError;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// OS socket error: connect, accept, read, or write failed.
    Network,
    /// A read or write timeout elapsed.
    Timeout,
    /// The peer closed the connection cleanly.
    EndOfFile,
    /// Malformed or oversize message.
    Protocol,
    /// Invalid index or offset into a container. Not fatal to a session.
    Range,
    /// Allocation or OS handle exhaustion.
    Resource,
    /// Operation invalid in the session's current state. Not fatal.
    State,
}

/// Errors that can occur in the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A socket operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Framing, pooling, or payload decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `init_io_threads` was called a second time.
    #[error("session {0} already started its i/o threads")]
    AlreadyInitialized(String),

    /// The session is shutting down and accepts no new work.
    #[error("session {0} is shutting down")]
    ShuttingDown(String),

    /// A message arrived that the session can't accept in its current
    /// state (for example, application traffic before login).
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// A handler rejected a message as a protocol violation.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// An OS thread or worker runtime could not be started.
    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(e) => transport_kind(e),
            Self::Protocol(e) => protocol_kind(e),
            Self::AlreadyInitialized(_) | Self::ShuttingDown(_) | Self::InvalidState(_) => {
                FailureKind::State
            }
            Self::Rejected(_) => FailureKind::Protocol,
            Self::Spawn { .. } => FailureKind::Resource,
        }
    }
}

fn transport_kind(err: &TransportError) -> FailureKind {
    match err {
        TransportError::ConnectionClosed(_) => FailureKind::EndOfFile,
        TransportError::Timeout { .. } => FailureKind::Timeout,
        _ => FailureKind::Network,
    }
}

fn protocol_kind(err: &ProtocolError) -> FailureKind {
    match err {
        ProtocolError::Eof => FailureKind::EndOfFile,
        ProtocolError::Transport(e) => transport_kind(e),
        ProtocolError::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::UnexpectedEof => FailureKind::EndOfFile,
            io::ErrorKind::OutOfMemory => FailureKind::Resource,
            _ => FailureKind::Network,
        },
        ProtocolError::OutOfRange { .. } => FailureKind::Range,
        ProtocolError::Allocation(_) => FailureKind::Resource,
        _ => FailureKind::Protocol,
    }
}
