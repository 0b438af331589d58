//! `std::io` adapter over a shared [`Socket`].

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::Socket;

/// Presents a [`Socket`] as a `Read + Write` byte stream.
///
/// Each thread that talks to a socket owns its own `SocketStream`; the
/// socket itself is shared through the `Arc`. Errors surface as
/// `io::Error`s wrapping the original
/// [`TransportError`](crate::TransportError), with end-of-file mapped to
/// `UnexpectedEof` and timeouts to `TimedOut`.
#[derive(Debug, Clone)]
pub struct SocketStream {
    socket: Arc<Socket>,
    name: String,
}

impl SocketStream {
    /// `name` is only used to label log output.
    pub fn new(socket: Arc<Socket>, name: impl Into<String>) -> Self {
        Self {
            socket,
            name: name.into(),
        }
    }

    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).map_err(io::Error::from)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.socket.read(buf).map_err(io::Error::from)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf).map_err(io::Error::from)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.socket.write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Writes go straight to the kernel; nothing is buffered here.
        Ok(())
    }
}
