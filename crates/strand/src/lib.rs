//! # Strand
//!
//! Threaded TCP server framework for long-lived client connections.
//!
//! Every client gets a session with its own reader and writer threads.
//! The writer pushes back on producers when a slow client falls behind,
//! and messages for a client that hasn't logged in yet wait in a standby
//! queue. The framework handles accepting, framing, buffering, and
//! teardown; the application supplies a [`MessageHandler`] and a
//! [`SessionPolicy`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strand::prelude::*;
//!
//! strand::logging::init();
//! let server = Server::<LoginGate>::builder()
//!     .bind("0.0.0.0", 7070)
//!     .handler(|session: &Arc<ClientSession<LoginGate>>, message: Message| -> Result<(), SessionError> {
//!         session.post_output_message(message.into_ptr(), false);
//!         Ok(())
//!     })
//!     .factory(|_: &Socket| LoginGate::online())
//!     .build()?;
//! server.run()?;
//! # Ok::<(), StrandError>(())
//! ```
//!
//! [`MessageHandler`]: strand_session::MessageHandler
//! [`SessionPolicy`]: strand_session::SessionPolicy

mod config;
mod error;
pub mod logging;
mod server;

pub use config::ServerConfig;
pub use error::StrandError;
pub use server::{Server, ServerBuilder, StopHandle};

pub use strand_protocol as protocol;
pub use strand_session as session;
pub use strand_text as text;
pub use strand_transport as transport;

pub mod prelude {
    pub use crate::{Server, ServerBuilder, ServerConfig, StopHandle, StrandError};
    pub use strand_protocol::{Codec, JsonCodec, Message, MessageKind, MessagePool, MessagePtr};
    pub use strand_session::{
        ClientSession, FailureKind, LoginGate, MessageHandler, SessionConfig, SessionError,
        SessionPolicy, SessionRegistry, WorkerPool,
    };
    pub use strand_text::{DetectedLineEndings, LineEnding, TextError, TextReader, TextWriter};
    pub use strand_transport::{ListenerSocket, Socket, SocketStream};
}
