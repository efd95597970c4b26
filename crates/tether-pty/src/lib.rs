//! tether-pty: run a child process in a pseudo-terminal and bridge its byte
//! stream to a terminal emulator.
//!
//! The crate does not interpret the stream. It spawns the child, pumps its
//! output to a [`SessionConsumer`], writes input back in submission order
//! and reports when the child's side of the pty goes away.
//!
//! # Architecture
//!
//! - [`PtySpawner`]: Capability that allocates a pty and starts the child.
//!   [`NativeSpawner`] is the `portable-pty` implementation.
//! - [`ProcessSession`]: Owns one child. Starts the reader and writer
//!   threads, exposes `start`/`send`/`stop`/`resize`, fans events out to the
//!   consumer.
//! - Read pump: One thread per session, one read outstanding at a time,
//!   each chunk delivered before the next read is issued.
//! - Write queue: One thread per session applying `send` buffers in order.
//! - [`EventChannel`]: Ready-made consumer forwarding events to a tokio
//!   channel.

mod chunk_log;
mod config;
mod consumer;
mod environment;
mod error;
mod events;
mod read_pump;
mod session;
mod size;
mod spawner;
mod state;
mod stats;
mod write_queue;

#[cfg(test)]
mod test_support;

pub use chunk_log::{chunk_path, ChunkLogger};
pub use config::{SessionConfig, DEFAULT_READ_BUFFER_SIZE};
pub use consumer::SessionConsumer;
pub use environment::{
    AllowlistEnvironment, EnvironmentPolicy, InheritedEnvironment, DEFAULT_TERM,
    STANDARD_ALLOWED_VARS,
};
pub use error::{PtyError, SessionError};
pub use events::{EventChannel, SessionEvent};
pub use session::{ProcessSession, SessionBuilder, SessionId};
pub use size::{WindowSize, DEFAULT_COLS, DEFAULT_ROWS};
pub use spawner::{default_shell, ChildControl, NativeSpawner, PtySpawner, SpawnRequest, SpawnedChild};
pub use state::SessionState;
pub use stats::SessionStats;
