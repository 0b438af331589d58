//! Blocking TCP transport for Strand.
//!
//! - [`Socket`]: a connected socket with optional read/write timeouts,
//!   byte counters, and idempotent half/full shutdown
//! - [`ListenerSocket`]: binds, listens, and accepts with a bounded wait
//!   so the accepting thread can notice a shutdown request
//! - [`SocketStream`]: `std::io::Read`/`Write` over a shared socket
//!
//! Everything here is synchronous: session threads block in these calls
//! and are released by closing the socket.

#[cfg(not(unix))]
compile_error!("strand-transport currently supports Unix platforms only");

mod error;
mod listener;
mod socket;
mod stream;
mod sys;

pub use error::TransportError;
pub use listener::{
    DEFAULT_ACCEPT_TIMEOUT, DEFAULT_BACKLOG, DefaultSocketFactory, ListenerSocket, SocketFactory,
};
pub use socket::{DEFAULT_BUFFER_SIZE, Socket};
pub use stream::SocketStream;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
