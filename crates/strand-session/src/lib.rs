//! Client session runtime for Strand.
//!
//! Each connected client is served by a [`ClientSession`] running two OS
//! threads:
//!
//! 1. **Input** ([`InputThread`]): reads framed messages from the socket
//!    and hands each one to the application's [`MessageHandler`].
//! 2. **Output** ([`MessageOutputThread`]): drains the session's output
//!    queue to the socket, pushing back on producers when a slow client
//!    lets the queue grow.
//!
//! Around them:
//!
//! - [`SessionPolicy`] says whether the client is online; until it is,
//!   broadcast messages wait in the session's standby queue.
//! - [`SessionRegistry`] tracks live sessions for broadcast and shutdown.
//! - [`SessionFactory`] turns an accepted socket into a session.
//! - [`WorkerPool`] runs slow handler work off the input thread.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)             ← accepts sockets, asks the factory for sessions
//!     ↕
//! Session Layer (this crate) ← threads, backpressure, standby, shutdown
//!     ↕
//! Protocol Layer (below)     ← Message, MessagePool, MessageQueue
//! ```

mod config;
mod error;
mod factory;
mod handler;
mod input;
mod output;
mod policy;
mod registry;
mod session;
mod worker;

pub use config::SessionConfig;
pub use error::{FailureKind, SessionError};
pub use factory::{SessionContext, SessionFactory};
pub use handler::MessageHandler;
pub use input::InputThread;
pub use output::{MessageOutputThread, WARNING_INTERVAL};
pub use policy::{LoginGate, SessionPolicy};
pub use registry::SessionRegistry;
pub use session::{ClientSession, ThreadRole};
pub use worker::WorkerPool;
