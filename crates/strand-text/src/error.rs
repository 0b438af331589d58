//! Error types for the text layer.

use std::io;

/// Errors that can occur while reading or writing text.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The stream ended before any byte of the requested line or
    /// character was read.
    #[error("end of stream")]
    Eof,

    /// The underlying reader or writer failed.
    #[error("text i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TextError {
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}
