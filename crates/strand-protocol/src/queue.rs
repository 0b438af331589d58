//! Thread-safe FIFO of messages with a blocking take.
//!
//! A [`MessageQueue`] connects any number of producers (threads posting
//! output for a session) with exactly one consumer (the session's output
//! thread). The consumer parks in
//! [`block_until_next_message`](MessageQueue::block_until_next_message)
//! until a producer posts, or until someone calls
//! [`wake_up`](MessageQueue::wake_up) to make it re-check its running flag.
//!
//! The queue also keeps a running total of the serialized bytes it holds,
//! which the output thread's backpressure policy compares against its
//! byte limit. Size and byte count live under the same lock, so the pair
//! returned by [`snapshot`](MessageQueue::snapshot) always describes the
//! same set of messages.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::{MessagePtr, ProtocolError};

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<MessagePtr>,
    /// Sum of `serialized_len()` over `messages`.
    data_size: u64,
    /// Set by `wake_up`; consumed by the next blocking take that finds the
    /// queue empty. Remembering it closes the race where the consumer
    /// checks its running flag just before a stop request arrives.
    wake_pending: bool,
}

impl QueueState {
    fn pop(&mut self) -> Option<MessagePtr> {
        let message = self.messages.pop_front()?;
        self.data_size -= message.serialized_len() as u64;
        Some(message)
    }
}

/// An ordered queue of shared messages.
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message` and wakes a blocked consumer.
    ///
    /// # Errors
    /// [`ProtocolError::Allocation`] if the queue can't grow. The message is
    /// dropped (and its buffer recycled) in that case.
    pub fn post(&self, message: MessagePtr) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        state
            .messages
            .try_reserve(1)
            .map_err(ProtocolError::Allocation)?;
        state.data_size += message.serialized_len() as u64;
        state.messages.push_back(message);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Pops the head message, blocking while the queue is empty.
    ///
    /// Returns `None` if [`wake_up`](Self::wake_up) was called and no
    /// message is available. Only one thread should block here at a time.
    pub fn block_until_next_message(&self) -> Option<MessagePtr> {
        let mut state = self.lock();
        loop {
            if let Some(message) = state.pop() {
                return Some(message);
            }
            if state.wake_pending {
                state.wake_pending = false;
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Kicks a blocked consumer back to its run loop without posting.
    pub fn wake_up(&self) {
        self.lock().wake_pending = true;
        self.available.notify_all();
    }

    /// Pops the head message without blocking.
    pub fn pop(&self) -> Option<MessagePtr> {
        self.lock().pop()
    }

    /// Removes and returns every queued message, oldest first.
    pub fn drain(&self) -> Vec<MessagePtr> {
        let mut state = self.lock();
        state.data_size = 0;
        state.messages.drain(..).collect()
    }

    /// Drops every queued message, returning pooled buffers to their pools.
    pub fn release_all_messages(&self) {
        // Drop outside the lock: recycling takes the pool's lock.
        let released = self.drain();
        drop(released);
    }

    /// Number of queued messages.
    pub fn queue_size(&self) -> usize {
        self.lock().messages.len()
    }

    /// Total serialized bytes of the queued messages.
    pub fn queue_data_size(&self) -> u64 {
        self.lock().data_size
    }

    /// `(queue_size, queue_data_size)` read under one lock.
    pub fn snapshot(&self) -> (usize, u64) {
        let state = self.lock();
        (state.messages.len(), state.data_size)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }
}
