//! Per-session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strand_protocol::DEFAULT_MAX_MESSAGE_SIZE;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Limits and timeouts applied to every session a server creates.
///
/// For every limit, zero means "disabled". `#[serde(default)]` lets a
/// config file name only the fields it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a session may keep buffering broadcast messages while its
    /// client isn't online. A standby post after this much time since the
    /// first one shuts the session down.
    pub standby_time_limit: Duration,

    /// Output queue byte count at which the queue counts as over limit.
    pub max_queue_data_size: u64,

    /// Output queue length at which the queue counts as over limit.
    pub max_queue_size: usize,

    /// How long an over-limit output queue is tolerated before the session
    /// is shut down. Zero shuts down on the first over-limit post.
    pub max_queue_grace_period: Duration,

    /// Upper bound for a single socket read. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,

    /// Upper bound for a single socket write. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,

    /// Largest inbound payload the input thread accepts.
    pub max_message_size: usize,

    /// Whether sessions get a dedicated output thread. Without one, every
    /// post is written synchronously by the posting thread.
    pub use_output_thread: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            standby_time_limit: Duration::ZERO,
            max_queue_data_size: 0,
            max_queue_size: 0,
            max_queue_grace_period: Duration::ZERO,
            read_timeout: None,
            write_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            use_output_thread: true,
        }
    }
}
