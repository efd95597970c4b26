use crate::size::WindowSize;

/// The capabilities a session needs from the terminal emulator it feeds.
///
/// Callbacks for one session are never invoked concurrently with each
/// other. They run on the session's reader thread (or on the thread calling
/// `stop`) and should return quickly: the next read is only issued after
/// `on_data_received` returns.
pub trait SessionConsumer: Send + Sync {
    /// One completed read. `bytes` is only valid for the duration of the call.
    fn on_data_received(&self, bytes: &[u8]);

    /// The session ended. Called exactly once; no data follows it.
    fn on_process_terminated(&self);

    /// Current window geometry, queried at spawn time and on resize.
    fn window_size(&self) -> WindowSize;
}
