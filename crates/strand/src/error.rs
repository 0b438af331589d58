//! Unified error type for the Strand framework.

use std::io;
use std::path::PathBuf;

use strand_protocol::ProtocolError;
use strand_session::SessionError;
use strand_text::TextError;
use strand_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `strand` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum StrandError {
    /// A transport-level error (bind, accept, connect, read, write).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, pooling, payload encoding).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (state, thread start, handler).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A text-level error (line reading and writing).
    #[error(transparent)]
    Text(#[from] TextError),

    /// The server was built without something it needs.
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// A configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A configuration document is not valid JSON for [`ServerConfig`](crate::ServerConfig).
    #[error("cannot parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The listener thread could not be started.
    #[error("cannot start listener thread: {0}")]
    Spawn(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let strand_err: StrandError = err.into();
        assert!(matches!(strand_err, StrandError::Transport(_)));
        assert!(strand_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let strand_err: StrandError = err.into();
        assert!(matches!(strand_err, StrandError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::ShuttingDown("s".into());
        let strand_err: StrandError = err.into();
        assert!(matches!(strand_err, StrandError::Session(_)));
    }

    #[test]
    fn test_from_text_error() {
        let strand_err: StrandError = TextError::Eof.into();
        assert!(matches!(strand_err, StrandError::Text(_)));
    }
}
