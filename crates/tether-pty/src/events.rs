//! A [`SessionConsumer`] that forwards session events into a channel.
//!
//! Useful when the code driving the session is async (`recv().await`) or
//! runs its own loop on a plain thread (`blocking_recv()`).

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::consumer::SessionConsumer;
use crate::size::WindowSize;

/// Events emitted by a session, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Data(Vec<u8>),
    Terminated,
}

/// Consumer that copies every chunk into an unbounded channel.
pub struct EventChannel {
    tx: mpsc::UnboundedSender<SessionEvent>,
    size: Mutex<WindowSize>,
}

impl EventChannel {
    /// Create the consumer and the receiver its events arrive on.
    pub fn new(size: WindowSize) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            tx,
            size: Mutex::new(size),
        });
        (channel, rx)
    }

    /// Set the size reported on the next spawn or resize.
    pub fn set_window_size(&self, size: WindowSize) {
        if let Ok(mut current) = self.size.lock() {
            *current = size;
        }
    }
}

impl SessionConsumer for EventChannel {
    fn on_data_received(&self, bytes: &[u8]) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(SessionEvent::Data(bytes.to_vec()));
    }

    fn on_process_terminated(&self) {
        let _ = self.tx.send(SessionEvent::Terminated);
    }

    fn window_size(&self) -> WindowSize {
        self.size.lock().map(|size| *size).unwrap_or_default()
    }
}
