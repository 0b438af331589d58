//! The output thread: drains a session's queue onto its socket.
//!
//! Producers call [`MessageOutputThread::post_output_message`] from any
//! thread. The output thread takes messages one at a time and hands each
//! to [`ClientSession::send_message_to_client`], which writes it under the
//! session mutex.
//!
//! # Backpressure
//!
//! A slow client makes the queue grow. Two soft limits bound it, queue
//! length and queued bytes (zero disables an axis). The queue is over
//! limit when it has reached either limit. Crossing over starts a grace
//! period: posts are still accepted, with a warning at most once a minute.
//! If the queue is still over limit once the grace period has passed, the
//! thread stops and the session is torn down.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use strand_protocol::{MessagePtr, MessageQueue};

use crate::{ClientSession, SessionConfig, SessionPolicy, ThreadRole};

/// Minimum time between two overflow warnings.
pub const WARNING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Overflow {
    /// When the queue last went from within limits to over limit.
    since: Option<Instant>,
    last_warning: Option<Instant>,
}

/// A session's asynchronous writer.
#[derive(Debug)]
pub struct MessageOutputThread {
    name: String,
    queue: MessageQueue,
    running: AtomicBool,
    max_queue_size: usize,
    max_queue_data_size: u64,
    grace_period: Duration,
    overflow: Mutex<Overflow>,
    warnings: AtomicU64,
    stop_logged: AtomicBool,
}

impl MessageOutputThread {
    /// Creates the thread state. It accepts posts right away; the OS
    /// thread is started by the owning session.
    pub fn new(name: impl Into<String>, config: &SessionConfig) -> Self {
        Self {
            name: name.into(),
            queue: MessageQueue::new(),
            running: AtomicBool::new(true),
            max_queue_size: config.max_queue_size,
            max_queue_data_size: config.max_queue_data_size,
            grace_period: config.max_queue_grace_period,
            overflow: Mutex::new(Overflow::default()),
            warnings: AtomicU64::new(0),
            stop_logged: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the thread to exit and wakes it if it is waiting for messages.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.queue.wake_up();
    }

    /// Queues `message` for sending.
    ///
    /// With `respect_limits` the backpressure policy applies. Returns
    /// `false` if the message was not queued: the thread is stopped, the
    /// grace period ran out, or the queue couldn't grow. In the last two
    /// cases the thread stops itself.
    pub fn post_output_message(&self, message: MessagePtr, respect_limits: bool) -> bool {
        if !self.is_running() {
            tracing::debug!(thread = %self.name, kind = %message.kind(), "output thread stopped, message dropped");
            return false;
        }

        if respect_limits && !self.admit() {
            return false;
        }

        match self.queue.post(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(thread = %self.name, error = %e, "cannot queue output message, stopping");
                self.stop();
                false
            }
        }
    }

    /// Applies the backpressure policy to one post.
    fn admit(&self) -> bool {
        let (size, data_size) = self.queue.snapshot();
        let over_limit = (self.max_queue_size > 0 && size >= self.max_queue_size)
            || (self.max_queue_data_size > 0 && data_size >= self.max_queue_data_size);

        let mut overflow = self.lock_overflow();
        if !over_limit {
            overflow.since = None;
            return true;
        }

        let now = Instant::now();
        let previous = overflow.since;
        let since = match previous {
            Some(since) => since,
            None if self.grace_period.is_zero() => {
                drop(overflow);
                self.stop_for_overflow(size, data_size);
                return false;
            }
            None => *overflow.since.insert(now),
        };

        let elapsed = now.duration_since(since);
        if elapsed > self.grace_period {
            drop(overflow);
            self.stop_for_overflow(size, data_size);
            return false;
        }

        let due = overflow
            .last_warning
            .is_none_or(|last| now.duration_since(last) >= WARNING_INTERVAL);
        if due {
            overflow.last_warning = Some(now);
            self.warnings.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                thread = %self.name,
                queue_size = size,
                queue_data_size = data_size,
                grace_remaining = ?self.grace_period.saturating_sub(elapsed),
                "output queue over limit"
            );
        }
        true
    }

    fn stop_for_overflow(&self, size: usize, data_size: u64) {
        if !self.stop_logged.swap(true, Ordering::AcqRel) {
            tracing::error!(
                thread = %self.name,
                queue_size = size,
                queue_data_size = data_size,
                grace_period = ?self.grace_period,
                "output queue over limit past grace period, stopping"
            );
        }
        self.stop();
    }

    /// Number of overflow warnings emitted so far.
    pub fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn queue_size(&self) -> usize {
        self.queue.queue_size()
    }

    pub fn queue_data_size(&self) -> u64 {
        self.queue.queue_data_size()
    }

    /// Drops everything still queued.
    pub fn release_all_queued_messages(&self) {
        self.queue.release_all_messages();
    }

    /// The thread body. Returns after [`stop`](Self::stop) and always ends
    /// by shutting the session down.
    pub(crate) fn run<P, W>(&self, session: &Arc<ClientSession<P>>, mut out: W)
    where
        P: SessionPolicy,
        W: Write,
    {
        tracing::debug!(session = %session.name(), thread = %self.name, "output thread started");

        while self.is_running() {
            let Some(message) = self.queue.block_until_next_message() else {
                continue;
            };
            session.send_message_to_client(&message, &self.name, &mut out);
        }

        self.release_all_queued_messages();
        tracing::debug!(session = %session.name(), thread = %self.name, "output thread exiting");
        session.shutdown(Some(ThreadRole::Output));
    }

    fn lock_overflow(&self) -> MutexGuard<'_, Overflow> {
        self.overflow.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::{HEADER_LEN, Message, MessageKind};

    fn msg(len: usize) -> MessagePtr {
        Message::new(MessageKind(1), vec![0u8; len]).into_ptr()
    }

    fn thread_with(config: SessionConfig) -> MessageOutputThread {
        MessageOutputThread::new("test-out", &config)
    }

    #[test]
    fn test_no_limits_accepts_everything() {
        let out = thread_with(SessionConfig::default());
        for _ in 0..100 {
            assert!(out.post_output_message(msg(10), true));
        }
        assert_eq!(out.queue_size(), 100);
        assert_eq!(out.warning_count(), 0);
    }

    #[test]
    fn test_zero_grace_stops_on_first_overflow() {
        let out = thread_with(SessionConfig {
            max_queue_size: 3,
            ..SessionConfig::default()
        });
        for _ in 0..3 {
            assert!(out.post_output_message(msg(1), true));
        }
        assert!(!out.post_output_message(msg(1), true));
        assert!(!out.is_running());
        assert_eq!(out.queue_size(), 3);

        assert!(!out.post_output_message(msg(1), false));
        assert_eq!(out.queue_size(), 3);
    }

    #[test]
    fn test_grace_period_tolerates_overflow_with_one_warning() {
        let out = thread_with(SessionConfig {
            max_queue_size: 3,
            max_queue_grace_period: Duration::from_secs(5),
            ..SessionConfig::default()
        });
        for _ in 0..10 {
            assert!(out.post_output_message(msg(1), true));
        }
        assert!(out.is_running());
        assert_eq!(out.queue_size(), 10);
        assert_eq!(out.warning_count(), 1);
    }

    #[test]
    fn test_grace_period_expiry_stops_thread() {
        let out = thread_with(SessionConfig {
            max_queue_size: 1,
            max_queue_grace_period: Duration::from_millis(50),
            ..SessionConfig::default()
        });
        assert!(out.post_output_message(msg(1), true));
        assert!(out.post_output_message(msg(1), true));
        std::thread::sleep(Duration::from_millis(80));
        assert!(!out.post_output_message(msg(1), true));
        assert!(!out.is_running());
    }

    #[test]
    fn test_back_within_limits_clears_overflow() {
        let out = thread_with(SessionConfig {
            max_queue_size: 1,
            max_queue_grace_period: Duration::from_millis(50),
            ..SessionConfig::default()
        });
        assert!(out.post_output_message(msg(1), true));
        assert!(out.post_output_message(msg(1), true));
        std::thread::sleep(Duration::from_millis(80));

        out.release_all_queued_messages();
        assert!(out.post_output_message(msg(1), true));
        assert!(out.post_output_message(msg(1), true), "new grace period starts");
        assert!(out.is_running());
    }

    #[test]
    fn test_data_size_axis() {
        let out = thread_with(SessionConfig {
            max_queue_data_size: (2 * (HEADER_LEN + 100)) as u64,
            ..SessionConfig::default()
        });
        assert!(out.post_output_message(msg(100), true));
        assert!(out.post_output_message(msg(100), true));
        assert!(!out.post_output_message(msg(100), true));
        assert!(!out.is_running());
    }

    #[test]
    fn test_respect_limits_false_skips_policy() {
        let out = thread_with(SessionConfig {
            max_queue_size: 1,
            ..SessionConfig::default()
        });
        for _ in 0..5 {
            assert!(out.post_output_message(msg(1), false));
        }
        assert!(out.is_running());
        assert_eq!(out.queue_size(), 5);
    }
}
