//! Ordered writes to the pty master that never block the sender.
//!
//! Every `send` becomes a [`PendingWrite`] on an unbounded channel. A
//! dedicated writer thread owns the master's writer and applies buffers one
//! at a time in channel order, so submission order is write order.

use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::SessionCore;
use crate::stats::Counters;

/// One buffer waiting to be written, tagged with its send sequence number.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    pub(crate) seq: u64,
    pub(crate) bytes: Vec<u8>,
}

/// Sending half of a session's write path.
///
/// Dropping it closes the channel; the writer thread then drains what is
/// left and exits, releasing the writer.
#[derive(Debug)]
pub(crate) struct WriteQueue {
    tx: mpsc::UnboundedSender<PendingWrite>,
}

impl WriteQueue {
    /// Start the writer thread for `core`'s session.
    pub(crate) fn start(core: Arc<SessionCore>, writer: Box<dyn Write + Send>) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name(format!("tether-write-{}", core.id))
            .spawn(move || write_loop(&core, writer, rx))?;
        Ok(Self { tx })
    }

    /// Queue `pending`. Returns `false` if the writer thread is gone.
    pub(crate) fn push(&self, pending: PendingWrite) -> bool {
        self.tx.send(pending).is_ok()
    }
}

fn write_loop(
    core: &SessionCore,
    mut writer: Box<dyn Write + Send>,
    mut rx: mpsc::UnboundedReceiver<PendingWrite>,
) {
    while let Some(pending) = rx.blocking_recv() {
        if !core.state.is_running() {
            log::debug!(
                "session {}: discarding write #{} ({} bytes), session terminated",
                core.id,
                pending.seq,
                pending.bytes.len()
            );
            Counters::bump(&core.stats.writes_discarded);
            continue;
        }

        match writer
            .write_all(&pending.bytes)
            .and_then(|()| writer.flush())
        {
            Ok(()) => {
                log::trace!(
                    "session {}: write #{} complete ({} bytes)",
                    core.id,
                    pending.seq,
                    pending.bytes.len()
                );
                core.stats.record_write(pending.bytes.len());
            }
            Err(e) => {
                log::warn!("session {}: write #{} failed: {e}", core.id, pending.seq);
                Counters::bump(&core.stats.writes_failed);
            }
        }
    }
    log::debug!("session {}: write queue closed", core.id);
}
