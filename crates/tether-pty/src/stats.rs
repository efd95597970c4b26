//! Diagnostic counters. None of these influence session behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Buffers accepted by `send`.
    pub sends_queued: u64,
    pub writes_completed: u64,
    pub writes_failed: u64,
    /// Buffers dropped because the session terminated before they were written.
    pub writes_discarded: u64,
    pub bytes_written: u64,
    pub chunks_read: u64,
    pub bytes_read: u64,
    pub chunks_logged: u64,
    pub log_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) sends_queued: AtomicU64,
    pub(crate) writes_completed: AtomicU64,
    pub(crate) writes_failed: AtomicU64,
    pub(crate) writes_discarded: AtomicU64,
    pub(crate) bytes_written: AtomicU64,
    pub(crate) chunks_read: AtomicU64,
    pub(crate) bytes_read: AtomicU64,
    pub(crate) chunks_logged: AtomicU64,
    pub(crate) log_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, len: usize) {
        Self::bump(&self.writes_completed);
        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, len: usize) {
        Self::bump(&self.chunks_read);
        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SessionStats {
            sends_queued: get(&self.sends_queued),
            writes_completed: get(&self.writes_completed),
            writes_failed: get(&self.writes_failed),
            writes_discarded: get(&self.writes_discarded),
            bytes_written: get(&self.bytes_written),
            chunks_read: get(&self.chunks_read),
            bytes_read: get(&self.bytes_read),
            chunks_logged: get(&self.chunks_logged),
            log_failures: get(&self.log_failures),
        }
    }
}
