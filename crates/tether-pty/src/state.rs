//! Session lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`crate::ProcessSession`].
///
/// `Idle -> Running` only through a successful `start`, `Running ->
/// Terminated` on end of stream, read error or `stop`. Nothing leaves
/// `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Terminated,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Running => 1,
            SessionState::Terminated => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Running,
            _ => SessionState::Terminated,
        }
    }
}

/// Atomic holder for a [`SessionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.load() == SessionState::Running
    }

    pub(crate) fn store(&self, state: SessionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `from` to `to`. Returns `false` if the current state was
    /// not `from`; only one caller can win a given transition.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
