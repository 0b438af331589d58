//! Codec trait and implementations for message payloads.
//!
//! The framing layer treats payloads as opaque bytes. Applications that
//! want typed payloads pick a "codec" (coder/decoder) that turns a Rust
//! value into payload bytes and back. This is the strategy pattern: the
//! [`Codec`] trait is the interface, [`JsonCodec`] one implementation.
//! A compact binary codec could be added without touching any session
//! code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to payload bytes and decodes them back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → a codec is shared by the input thread that decodes
///   requests and whatever threads post replies.
/// - `'static` → the codec owns everything it needs, so it can live in a
///   handler that outlives any single session.
///
/// `decode` uses `DeserializeOwned` (vs plain `Deserialize`) so the result
/// doesn't borrow from the payload; the message can be dropped and its
/// buffer recycled right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into payload bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes payload bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable payloads are handy while developing a protocol: a
/// packet capture shows exactly what was sent. This is behind the `json`
/// feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use strand_protocol::{Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&vec![1, 2, 3]).unwrap();
/// let decoded: Vec<i32> = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, vec![1, 2, 3]);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
