//! Error types for the protocol layer.
//!
//! Like every Strand crate, the protocol layer has its own error enum.
//! When you see a `ProtocolError`, the problem is in framing, pooling,
//! queueing, or payload encoding, not in socket setup or session state.

use std::collections::TryReserveError;
use std::io;

use strand_transport::TransportError;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The stream ended cleanly on a message boundary.
    ///
    /// For an input thread this is the normal way a session ends: the
    /// peer hung up between messages.
    #[error("end of stream")]
    Eof,

    /// The stream ended in the middle of a message.
    #[error("truncated message: {0}")]
    Truncated(String),

    /// The header announced a payload bigger than the configured limit.
    #[error("message payload of {size} bytes exceeds limit of {max} bytes")]
    Oversize { size: usize, max: usize },

    /// The socket underneath failed (timeout, reset, ...).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any other I/O failure from a non-socket stream.
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    /// A slice of the payload was requested outside its bounds.
    #[error("range {start}..{end} out of bounds for payload of {len} bytes")]
    OutOfRange { start: usize, end: usize, len: usize },

    /// A queue could not grow to hold another message.
    #[error("queue allocation failed: {0}")]
    Allocation(#[source] TryReserveError),

    /// Serialization of a payload value failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization of a payload value failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is well framed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` for a clean end of stream.
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Eof => true,
            Self::Transport(e) => e.is_eof(),
            _ => false,
        }
    }

    /// Returns `true` if a socket timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Converts an I/O error, unwrapping a [`TransportError`] if the stream
    /// was a [`SocketStream`](strand_transport::SocketStream).
    pub fn from_io(err: io::Error) -> Self {
        let carries_transport = err
            .get_ref()
            .is_some_and(|inner| inner.is::<TransportError>());
        if !carries_transport {
            return Self::Io(err);
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<TransportError>()) {
            Some(Ok(transport)) => Self::Transport(*transport),
            Some(Err(other)) => Self::Io(io::Error::new(kind, other)),
            None => Self::Io(io::Error::from(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_io_unwraps_transport_error() {
        let io_err: io::Error = TransportError::Timeout {
            operation: "read",
            timeout: Duration::from_secs(1),
        }
        .into();
        let err = ProtocolError::from_io(io_err);
        assert!(matches!(err, ProtocolError::Transport(_)));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_from_io_keeps_plain_errors() {
        let err = ProtocolError::from_io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, ProtocolError::Io(_)));
        assert!(!err.is_eof());
    }

    #[test]
    fn test_transport_eof_counts_as_eof() {
        let err: ProtocolError = TransportError::ConnectionClosed("bye".into()).into();
        assert!(err.is_eof());
        assert!(ProtocolError::Eof.is_eof());
    }
}
