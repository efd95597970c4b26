//! Error types for spawning and driving a pty session.

use std::io;

use thiserror::Error;

/// Errors from the pty capability (allocation, spawn, resize).
#[derive(Error, Debug)]
pub enum PtyError {
    /// The pty pair could not be allocated.
    #[error("failed to open PTY: {0}")]
    Open(String),

    /// The child program could not be started inside the pty.
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    /// The window size could not be applied.
    #[error("PTY resize failed: {0}")]
    Resize(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by [`crate::ProcessSession`] operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `start` could not produce a child. The session is still idle.
    #[error(transparent)]
    Spawn(#[from] PtyError),

    /// The running pty rejected a new window size.
    #[error("resize failed: {0}")]
    Resize(#[source] PtyError),

    /// The session already ran to completion and cannot be restarted.
    #[error("session has terminated; create a new session")]
    Terminated,

    /// The operation needs a running child.
    #[error("session is not running")]
    NotRunning,

    /// A reader or writer thread could not be started.
    #[error("failed to start I/O thread: {0}")]
    Thread(io::Error),
}
