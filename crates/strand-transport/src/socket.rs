//! Blocking TCP socket with timeouts and byte counters.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::sys::{self, Interest};
use crate::{ConnectionId, TransportError};

/// Send and receive buffer size applied by [`Socket::set_default_sock_opt`].
pub const DEFAULT_BUFFER_SIZE: i32 = 65535;

/// A connected, blocking TCP socket.
///
/// All operations take `&self` so one thread can read while another
/// writes (the session's input and output threads share a socket this
/// way). The socket must not be read from two threads at once, nor
/// written from two threads at once.
///
/// When a read (or write) timeout is set, every syscall is preceded by a
/// `poll` on this single descriptor; if it does not become ready in time
/// the operation fails with [`TransportError::Timeout`].
#[derive(Debug)]
pub struct Socket {
    stream: TcpStream,
    id: ConnectionId,
    host_name: String,
    port: u16,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    last_event: Mutex<Instant>,
    read_timeout: Mutex<Option<Duration>>,
    write_timeout: Mutex<Option<Duration>>,
    read_closed: AtomicBool,
    write_closed: AtomicBool,
}

impl Socket {
    /// Resolves `host` and opens an outbound connection to it.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port)).map_err(|source| {
            TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source,
            }
        })?;
        tracing::debug!(host, port, "connected");
        Ok(Self::with_peer(stream, host.to_string(), port))
    }

    /// Wraps an already connected stream (typically one just accepted).
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let peer = stream.peer_addr().map_err(|source| {
            TransportError::SocketOption {
                option: "peer_addr",
                source,
            }
        })?;
        Ok(Self::with_peer(stream, peer.ip().to_string(), peer.port()))
    }

    fn with_peer(stream: TcpStream, host_name: String, port: u16) -> Self {
        Self {
            stream,
            id: ConnectionId::next(),
            host_name,
            port,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            last_event: Mutex::new(Instant::now()),
            read_timeout: Mutex::new(None),
            write_timeout: Mutex::new(None),
            read_closed: AtomicBool::new(false),
            write_closed: AtomicBool::new(false),
        }
    }

    /// Process-unique identifier assigned when the socket was created.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote host as given to `connect`, or the peer IP if accepted.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// The remote port number.
    pub fn port_number(&self) -> u16 {
        self.port
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        self.stream
            .peer_addr()
            .map_err(|source| TransportError::SocketOption {
                option: "peer_addr",
                source,
            })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.stream
            .local_addr()
            .map_err(|source| TransportError::SocketOption {
                option: "local_addr",
                source,
            })
    }

    // -----------------------------------------------------------------------
    // I/O
    // -----------------------------------------------------------------------

    /// Performs a single receive into `buf`.
    ///
    /// Returns the number of bytes read; `0` means the peer closed the
    /// connection (or the read side was shut down locally).
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(timeout) = self.read_timeout() {
            let ready = sys::wait_ready(self.stream.as_raw_fd(), Interest::Read, timeout)
                .map_err(TransportError::ReceiveFailed)?;
            if !ready {
                return Err(TransportError::Timeout {
                    operation: "read",
                    timeout,
                });
            }
        }

        loop {
            match (&self.stream).read(buf) {
                Ok(n) => {
                    if n > 0 {
                        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                        self.touch();
                    }
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
    }

    /// Reads exactly `buf.len()` bytes.
    ///
    /// Fails with [`TransportError::ConnectionClosed`] if the peer closes
    /// before the buffer is full.
    pub fn read(&self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.recv(&mut buf[filled..])?;
            if n == 0 {
                let reason = if filled == 0 {
                    "peer closed connection".to_string()
                } else {
                    format!(
                        "peer closed connection after {filled} of {} bytes",
                        buf.len()
                    )
                };
                return Err(TransportError::ConnectionClosed(reason));
            }
            filled += n;
        }
        Ok(())
    }

    /// Performs a single send from `buf`, returning the number of bytes
    /// accepted by the kernel.
    pub fn send(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(timeout) = self.write_timeout() {
            let ready = sys::wait_ready(self.stream.as_raw_fd(), Interest::Write, timeout)
                .map_err(TransportError::SendFailed)?;
            if !ready {
                return Err(TransportError::Timeout {
                    operation: "write",
                    timeout,
                });
            }
        }

        loop {
            match (&self.stream).write(buf) {
                Ok(0) => {
                    return Err(TransportError::SendFailed(io::Error::from(
                        io::ErrorKind::WriteZero,
                    )));
                }
                Ok(n) => {
                    self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
                    self.touch();
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::SendFailed(e)),
            }
        }
    }

    /// Writes all of `buf`.
    pub fn write(&self, buf: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < buf.len() {
            written += self.send(&buf[written..])?;
        }
        Ok(())
    }

    /// Number of bytes that can be read right now without blocking.
    pub fn available(&self) -> Result<usize, TransportError> {
        sys::bytes_available(self.stream.as_raw_fd()).map_err(|source| {
            TransportError::SocketOption {
                option: "FIONREAD",
                source,
            }
        })
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    /// Sets `SO_LINGER`; `None` turns lingering off.
    pub fn set_linger(&self, linger: Option<Duration>) -> Result<(), TransportError> {
        sys::set_linger(self.stream.as_raw_fd(), linger).map_err(|source| {
            TransportError::SocketOption {
                option: "SO_LINGER",
                source,
            }
        })
    }

    pub fn set_read_timeout(&self, timeout: Duration) {
        *lock(&self.read_timeout) = Some(timeout);
    }

    pub fn clear_read_timeout(&self) {
        *lock(&self.read_timeout) = None;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        *lock(&self.read_timeout)
    }

    pub fn set_write_timeout(&self, timeout: Duration) {
        *lock(&self.write_timeout) = Some(timeout);
    }

    pub fn clear_write_timeout(&self) {
        *lock(&self.write_timeout) = None;
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        *lock(&self.write_timeout)
    }

    /// Applies the defaults every session socket gets: `TCP_NODELAY` and
    /// 64 KiB send/receive buffers.
    pub fn set_default_sock_opt(&self) -> Result<(), TransportError> {
        self.stream
            .set_nodelay(true)
            .map_err(|source| TransportError::SocketOption {
                option: "TCP_NODELAY",
                source,
            })?;
        sys::set_buffer_sizes(self.stream.as_raw_fd(), DEFAULT_BUFFER_SIZE).map_err(
            |source| TransportError::SocketOption {
                option: "SO_RCVBUF/SO_SNDBUF",
                source,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Shuts down both directions. Any thread blocked reading or writing
    /// this socket is released. Calling it again is a no-op.
    pub fn close(&self) {
        let read_was_closed = self.read_closed.swap(true, Ordering::AcqRel);
        let write_was_closed = self.write_closed.swap(true, Ordering::AcqRel);
        if read_was_closed && write_was_closed {
            return;
        }
        self.shutdown(Shutdown::Both);
    }

    /// Shuts down the read side only.
    pub fn close_read(&self) {
        if !self.read_closed.swap(true, Ordering::AcqRel) {
            self.shutdown(Shutdown::Read);
        }
    }

    /// Shuts down the write side only.
    pub fn close_write(&self) {
        if !self.write_closed.swap(true, Ordering::AcqRel) {
            self.shutdown(Shutdown::Write);
        }
    }

    /// Returns `true` once both directions have been shut down.
    pub fn is_closed(&self) -> bool {
        self.read_closed.load(Ordering::Acquire) && self.write_closed.load(Ordering::Acquire)
    }

    fn shutdown(&self, how: Shutdown) {
        if let Err(e) = self.stream.shutdown(how) {
            // NotConnected just means the peer got there first.
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::debug!(id = %self.id, error = %e, ?how, "socket shutdown failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Time since the last successful read or write (or since creation).
    pub fn idle_time(&self) -> Duration {
        lock(&self.last_event).elapsed()
    }

    fn touch(&self) {
        *lock(&self.last_event) = Instant::now();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
