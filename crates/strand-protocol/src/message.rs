//! The framed message record and its wire format.
//!
//! Every unit that travels between a session and its peer is a
//! [`Message`]: a numeric kind plus an opaque payload. On the wire a
//! message is an 8-byte header followed by the payload:
//!
//! ```text
//! +----------------+----------------+-------------------+
//! | length: u32 BE | kind: u32 BE   | payload (length)  |
//! +----------------+----------------+-------------------+
//! ```
//!
//! The header's `length` counts payload bytes only, so a message's
//! serialized length is always `HEADER_LEN + payload.len()`. That number
//! is what queues add up when they account for queued bytes.

use std::fmt;
use std::io::{Read, Write};
use std::ops::Range;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::pool::PoolShared;
use crate::{Codec, MessagePool, ProtocolError};

/// Size of the fixed header that precedes every payload.
pub const HEADER_LEN: usize = 8;

/// Largest payload accepted by default when reading from a peer.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Application-defined message type tag.
///
/// A newtype over `u32` so a kind can't be confused with a length or an
/// offset. `#[serde(transparent)]` serializes it as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKind(pub u32);

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind-{}", self.0)
    }
}

/// Shared handle to a message.
///
/// Messages are immutable once posted, and a broadcast message may sit in
/// several sessions' queues at once, so queues hold `Arc<Message>`. When
/// the last holder drops its `Arc`, the message's buffer goes back to the
/// pool it came from.
pub type MessagePtr = Arc<Message>;

/// One application-level record: a kind and a payload.
pub struct Message {
    kind: MessageKind,
    payload: Vec<u8>,
    /// The pool to return our buffer to. `Weak` so an outstanding message
    /// never keeps a dropped pool alive.
    pool: Option<Weak<PoolShared>>,
}

impl Message {
    /// Creates a message that doesn't belong to any pool.
    pub fn new(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            pool: None,
        }
    }

    /// Used by [`MessagePool`] to hand out a recycled buffer.
    pub(crate) fn pooled(kind: MessageKind, buffer: Vec<u8>, pool: Weak<PoolShared>) -> Self {
        Self {
            kind,
            payload: buffer,
            pool: Some(pool),
        }
    }

    /// Serializes `value` with `codec` into a new message of `kind`.
    pub fn from_value<T: Serialize>(
        kind: MessageKind,
        value: &T,
        codec: &impl Codec,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(kind, codec.encode(value)?))
    }

    /// Deserializes the payload with `codec`.
    pub fn to_value<T: DeserializeOwned>(&self, codec: &impl Codec) -> Result<T, ProtocolError> {
        codec.decode(&self.payload)
    }

    /// Wraps the message in an `Arc` so it can be posted to queues.
    pub fn into_ptr(self) -> MessagePtr {
        Arc::new(self)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: MessageKind) {
        self.kind = kind;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable access for building a message before it is posted.
    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    /// Returns `payload[range]`, or [`ProtocolError::OutOfRange`] instead
    /// of panicking when the range doesn't fit.
    pub fn payload_range(&self, range: Range<usize>) -> Result<&[u8], ProtocolError> {
        let len = self.payload.len();
        if range.start > range.end || range.end > len {
            return Err(ProtocolError::OutOfRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        Ok(&self.payload[range])
    }

    /// Number of bytes this message occupies on the wire.
    pub fn serialized_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Returns `true` if this message came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<PoolShared>) -> bool {
        self.pool
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(shared)))
    }

    /// Writes the complete on-wire form of this message and flushes.
    ///
    /// `label` identifies the sender in log output (a session name or a
    /// thread name).
    pub fn send<W: Write + ?Sized>(&self, label: &str, out: &mut W) -> Result<(), ProtocolError> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "payload of {} bytes does not fit a u32 length",
                self.payload.len()
            ))
        })?;

        // Header and payload leave in a single write.
        let mut frame = Vec::new();
        frame
            .try_reserve_exact(self.serialized_len())
            .map_err(ProtocolError::Allocation)?;
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&self.kind.0.to_be_bytes());
        frame.extend_from_slice(&self.payload);

        out.write_all(&frame).map_err(ProtocolError::from_io)?;
        out.flush().map_err(ProtocolError::from_io)?;

        tracing::trace!(label, kind = %self.kind, bytes = self.serialized_len(), "sent message");
        Ok(())
    }

    /// Blocks until one complete message has been read from `input`.
    ///
    /// The message buffer is taken from `pool`. Returns
    /// [`ProtocolError::Eof`] if the stream ends before the first header
    /// byte, [`ProtocolError::Truncated`] if it ends anywhere later, and
    /// [`ProtocolError::Oversize`] if the announced payload is larger
    /// than `max_size`.
    pub fn receive<R: Read + ?Sized>(
        input: &mut R,
        pool: &MessagePool,
        max_size: usize,
    ) -> Result<Self, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match input.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Err(ProtocolError::Eof),
                Ok(0) => {
                    return Err(ProtocolError::Truncated(format!(
                        "stream ended after {filled} of {HEADER_LEN} header bytes"
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProtocolError::from_io(e)),
            }
        }

        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = MessageKind(u32::from_be_bytes([header[4], header[5], header[6], header[7]]));
        if len > max_size {
            return Err(ProtocolError::Oversize {
                size: len,
                max: max_size,
            });
        }

        let mut message = pool.get(kind);
        let payload = message.payload_mut();
        payload.resize(len, 0);
        input.read_exact(payload).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Truncated(format!("stream ended inside {len}-byte payload"))
            } else {
                ProtocolError::from_io(e)
            }
        })?;

        Ok(message)
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) {
            pool.recycle(std::mem::take(&mut self.payload));
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("len", &self.payload.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}

impl Eq for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_len_includes_header() {
        let msg = Message::new(MessageKind(1), b"hi".to_vec());
        assert_eq!(msg.serialized_len(), HEADER_LEN + 2);
    }

    #[test]
    fn test_send_writes_header_then_payload() {
        let msg = Message::new(MessageKind(0x0102), b"hi".to_vec());
        let mut out = Vec::new();
        msg.send("test", &mut out).unwrap();
        assert_eq!(
            out,
            vec![0, 0, 0, 2, 0, 0, 0x01, 0x02, b'h', b'i']
        );
    }

    /// Records the size of every `write` call it sees.
    #[derive(Default)]
    struct WriteLog(Vec<usize>);

    impl Write for WriteLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_issues_a_single_write() {
        let msg = Message::new(MessageKind(5), vec![7u8; 100]);
        let mut out = WriteLog::default();
        msg.send("test", &mut out).unwrap();
        assert_eq!(out.0, vec![HEADER_LEN + 100]);

        let mut out = WriteLog::default();
        Message::new(MessageKind(6), Vec::new()).send("test", &mut out).unwrap();
        assert_eq!(out.0, vec![HEADER_LEN]);
    }

    #[test]
    fn test_receive_reads_what_send_wrote() {
        let pool = MessagePool::default();
        let mut wire = Vec::new();
        Message::new(MessageKind(7), b"first".to_vec())
            .send("test", &mut wire)
            .unwrap();
        Message::new(MessageKind(8), Vec::new())
            .send("test", &mut wire)
            .unwrap();

        let mut input = wire.as_slice();
        let first = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        let second = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(first.kind(), MessageKind(7));
        assert_eq!(first.payload(), b"first");
        assert_eq!(second.kind(), MessageKind(8));
        assert!(second.payload().is_empty());

        let err = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err, ProtocolError::Eof));
    }

    #[test]
    fn test_receive_truncated_header() {
        let pool = MessagePool::default();
        let mut input: &[u8] = &[0, 0, 0];
        let err = Message::receive(&mut input, &pool, 1024).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(_)));
        assert!(!err.is_eof());
    }

    #[test]
    fn test_receive_truncated_payload() {
        let pool = MessagePool::default();
        let mut input: &[u8] = &[0, 0, 0, 4, 0, 0, 0, 1, b'a'];
        let err = Message::receive(&mut input, &pool, 1024).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(_)));
    }

    #[test]
    fn test_receive_rejects_oversize() {
        let pool = MessagePool::default();
        let mut input: &[u8] = &[0, 0, 1, 0, 0, 0, 0, 1];
        let err = Message::receive(&mut input, &pool, 255).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Oversize { size: 256, max: 255 }
        ));
    }

    #[test]
    fn test_payload_range() {
        let msg = Message::new(MessageKind(1), b"abcdef".to_vec());
        assert_eq!(msg.payload_range(1..3).unwrap(), b"bc");
        assert_eq!(msg.payload_range(6..6).unwrap(), b"");
        assert!(matches!(
            msg.payload_range(4..9),
            Err(ProtocolError::OutOfRange { start: 4, end: 9, len: 6 })
        ));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_from_value_and_to_value() {
        use crate::JsonCodec;

        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Greeting {
            text: String,
        }

        let greeting = Greeting { text: "hi".into() };
        let msg = Message::from_value(MessageKind(3), &greeting, &JsonCodec).unwrap();
        let decoded: Greeting = msg.to_value(&JsonCodec).unwrap();
        assert_eq!(decoded, greeting);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind(12).to_string(), "kind-12");
    }
}
