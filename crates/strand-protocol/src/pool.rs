//! Recycling of message buffers.
//!
//! Reading a message allocates a payload buffer. Under steady traffic the
//! same sizes come and go over and over, so instead of freeing a buffer
//! when its message is dropped we keep it in a [`MessagePool`] and hand
//! it to the next message. A message remembers which pool it came from
//! and returns its buffer there when the last reference goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{Message, MessageKind};

/// How many idle buffers a pool keeps by default.
pub const DEFAULT_MAX_POOLED: usize = 256;

/// Buffers that grew beyond this are freed instead of pooled, so one huge
/// message doesn't pin its memory forever.
pub const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// Counters describing how a pool has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Messages handed out with a freshly allocated buffer.
    pub allocated: u64,
    /// Messages handed out with a recycled buffer.
    pub reused: u64,
    /// Buffers returned to the pool.
    pub recycled: u64,
}

/// A cheaply cloneable handle to a shared buffer pool.
///
/// Cloning gives another handle to the *same* pool, the way cloning an
/// `Arc` does.
#[derive(Debug, Clone)]
pub struct MessagePool {
    shared: Arc<PoolShared>,
}

#[derive(Debug)]
pub(crate) struct PoolShared {
    name: String,
    max_pooled: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
    allocated: AtomicU64,
    reused: AtomicU64,
    recycled: AtomicU64,
}

impl MessagePool {
    /// Creates a pool that keeps at most `max_pooled` idle buffers.
    pub fn new(name: impl Into<String>, max_pooled: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                name: name.into(),
                max_pooled,
                buffers: Mutex::new(Vec::new()),
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
            }),
        }
    }

    /// Returns an empty message of `kind`, reusing an idle buffer when one
    /// is available and allocating otherwise.
    pub fn get(&self, kind: MessageKind) -> Message {
        let recycled = self
            .shared
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let buffer = match recycled {
            Some(buffer) => {
                self.shared.reused.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };
        Message::pooled(kind, buffer, Arc::downgrade(&self.shared))
    }

    /// Returns a message of `kind` whose payload is a copy of `payload`.
    pub fn get_with_payload(&self, kind: MessageKind, payload: &[u8]) -> Message {
        let mut message = self.get(kind);
        message.payload_mut().extend_from_slice(payload);
        message
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of idle buffers currently held.
    pub fn idle_count(&self) -> usize {
        self.shared
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.shared.allocated.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
        }
    }

    /// Returns `true` if `message` will return its buffer to this pool.
    pub fn owns(&self, message: &Message) -> bool {
        message.belongs_to(&self.shared)
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new("default", DEFAULT_MAX_POOLED)
    }
}

impl PoolShared {
    /// Takes back a buffer from a dropped message.
    pub(crate) fn recycle(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() == 0 || buffer.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buffer.clear();

        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.max_pooled {
            buffers.push(buffer);
            self.recycled.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_allocates_when_empty() {
        let pool = MessagePool::new("test", 4);
        let msg = pool.get(MessageKind(1));
        assert!(msg.is_pooled());
        assert!(pool.owns(&msg));
        assert_eq!(pool.stats().allocated, 1);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_dropped_message_returns_buffer() {
        let pool = MessagePool::new("test", 4);
        let msg = pool.get_with_payload(MessageKind(1), b"payload");
        drop(msg);
        assert_eq!(pool.idle_count(), 1);

        let mut again = pool.get(MessageKind(2));
        assert!(again.payload().is_empty(), "recycled buffer must be cleared");
        assert!(again.payload_mut().capacity() >= 7);
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated: 1,
                reused: 1,
                recycled: 1
            }
        );
    }

    #[test]
    fn test_shared_message_returns_once_last_holder_drops() {
        let pool = MessagePool::new("test", 4);
        let ptr = pool.get_with_payload(MessageKind(1), b"x").into_ptr();
        let other = Arc::clone(&ptr);

        drop(ptr);
        assert_eq!(pool.idle_count(), 0);
        drop(other);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_pool_respects_max_pooled() {
        let pool = MessagePool::new("test", 1);
        let a = pool.get_with_payload(MessageKind(1), b"a");
        let b = pool.get_with_payload(MessageKind(1), b"b");
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_unpooled_message_does_not_touch_pool() {
        let pool = MessagePool::new("test", 4);
        let msg = Message::new(MessageKind(1), b"x".to_vec());
        assert!(!pool.owns(&msg));
        drop(msg);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_message_outliving_pool_is_fine() {
        let pool = MessagePool::new("test", 4);
        let msg = pool.get_with_payload(MessageKind(1), b"x");
        drop(pool);
        drop(msg);
    }
}
