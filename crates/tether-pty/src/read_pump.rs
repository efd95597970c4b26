//! Per-session reader thread that pumps pty output to the consumer.
//!
//! PTY reads are blocking, so each session gets a dedicated OS thread that
//! owns the master's reader outright. Exactly one read is outstanding at a
//! time: the next read is only issued after the previous chunk has been
//! delivered.

use std::io::{self, Read};
use std::sync::Arc;

use crate::session::SessionCore;

/// Start the read loop for a session on a dedicated OS thread.
pub(crate) fn start_read_pump(
    core: Arc<SessionCore>,
    reader: Box<dyn Read + Send>,
    capacity: usize,
) -> io::Result<()> {
    std::thread::Builder::new()
        .name(format!("tether-read-{}", core.id))
        .spawn(move || {
            core.mark_reader_thread();
            pump_loop(&core, reader, capacity);
        })?;
    Ok(())
}

fn pump_loop(core: &SessionCore, mut reader: Box<dyn Read + Send>, capacity: usize) {
    let mut buf = vec![0u8; capacity.max(1)];

    loop {
        // Blocks until data is available or the pty closes.
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                core.terminate("end of stream");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                core.terminate(&format!("read error: {e}"));
                return;
            }
        };

        if !core.deliver_chunk(&buf[..n]) {
            log::debug!("session {}: read pump exiting, session stopped", core.id);
            return;
        }
    }
}
