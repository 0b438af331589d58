//! Message layer for Strand.
//!
//! This crate defines what a session exchanges with its peer and how it
//! is buffered on the way out:
//!
//! - **Framing** ([`Message`], [`MessageKind`]): a length-prefixed,
//!   typed record and its `send`/`receive` wire routines.
//! - **Pooling** ([`MessagePool`]): payload buffers are recycled when
//!   the last reference to a message drops.
//! - **Queueing** ([`MessageQueue`]): a thread-safe FIFO with a blocking
//!   take and a running byte count, used by output threads and standby
//!   buffering.
//! - **Payload codecs** ([`Codec`], [`JsonCodec`]): optional typed
//!   payloads on top of the opaque bytes.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (threads, policy)
//! ```

mod codec;
mod error;
mod message;
mod pool;
mod queue;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{DEFAULT_MAX_MESSAGE_SIZE, HEADER_LEN, Message, MessageKind, MessagePtr};
pub use pool::{DEFAULT_MAX_POOLED, MAX_POOLED_CAPACITY, MessagePool, PoolStats};
pub use queue::MessageQueue;
