use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use crate::chunk_log::ChunkLogger;
use crate::config::{SessionConfig, DEFAULT_READ_BUFFER_SIZE};
use crate::consumer::SessionConsumer;
use crate::environment::{AllowlistEnvironment, EnvironmentPolicy, InheritedEnvironment};
use crate::error::SessionError;
use crate::read_pump::start_read_pump;
use crate::spawner::{ChildControl, NativeSpawner, PtySpawner, SpawnRequest, SpawnedChild};
use crate::state::{SessionState, StateCell};
use crate::stats::{Counters, SessionStats};
use crate::write_queue::{PendingWrite, WriteQueue};

/// Unique identifier for a session, used in thread names and log lines.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session handle, its reader thread and its
/// writer thread.
pub(crate) struct SessionCore {
    pub(crate) id: SessionId,
    pub(crate) state: StateCell,
    pub(crate) stats: Counters,
    pub(crate) chunk_log: ChunkLogger,
    consumer: Arc<dyn SessionConsumer>,
    /// Held while a callback runs so the consumer is never entered twice.
    delivery: Mutex<()>,
    reader_thread: OnceLock<ThreadId>,
    queue: Mutex<Option<WriteQueue>>,
    control: Mutex<Option<Box<dyn ChildControl>>>,
    next_seq: AtomicU64,
}

impl SessionCore {
    pub(crate) fn new(consumer: Arc<dyn SessionConsumer>, chunk_log: ChunkLogger) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: StateCell::new(SessionState::Idle),
            stats: Counters::default(),
            chunk_log,
            consumer,
            delivery: Mutex::new(()),
            reader_thread: OnceLock::new(),
            queue: Mutex::new(None),
            control: Mutex::new(None),
            next_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn mark_reader_thread(&self) {
        let _ = self.reader_thread.set(thread::current().id());
    }

    fn on_reader_thread(&self) -> bool {
        self.reader_thread.get() == Some(&thread::current().id())
    }

    /// Hand one read completion to the consumer.
    ///
    /// Returns `false` once the session is no longer running, in which case
    /// the chunk was not delivered and no further reads should be issued.
    pub(crate) fn deliver_chunk(&self, chunk: &[u8]) -> bool {
        let _gate = lock(&self.delivery);
        if !self.state.is_running() {
            return false;
        }

        self.stats.record_read(chunk.len());
        match self.chunk_log.record(chunk) {
            Ok(Some(_)) => Counters::bump(&self.stats.chunks_logged),
            Ok(None) => {}
            Err(e) => {
                log::warn!("session {}: failed to log chunk: {e}", self.id);
                Counters::bump(&self.stats.log_failures);
            }
        }

        self.consumer.on_data_received(chunk);
        self.state.is_running()
    }

    /// Move a running session to `Terminated`, close the write path and the
    /// pty master, and notify the consumer. Only the first caller does
    /// anything.
    pub(crate) fn terminate(&self, reason: &str) -> bool {
        if !self
            .state
            .transition(SessionState::Running, SessionState::Terminated)
        {
            return false;
        }
        log::debug!("session {} terminated: {reason}", self.id);
        lock(&self.queue).take();
        // The child handle stays behind so the exit status can be polled.
        if let Some(control) = lock(&self.control).as_mut() {
            control.release_pty();
        }

        if self.on_reader_thread() {
            // Either the pump itself, or a consumer calling `stop` from a
            // callback; the gate is already ours or not needed.
            self.consumer.on_process_terminated();
        } else {
            let _gate = lock(&self.delivery);
            self.consumer.on_process_terminated();
        }
        true
    }

    fn enqueue(&self, bytes: &[u8]) {
        let queue = lock(&self.queue);
        let Some(queue) = queue.as_ref() else {
            return;
        };
        // Sequence numbers are taken under the queue lock so they match
        // channel order even with concurrent senders.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if queue.push(PendingWrite {
            seq,
            bytes: bytes.to_vec(),
        }) {
            Counters::bump(&self.stats.sends_queued);
            log::trace!("session {}: queued write #{seq} ({} bytes)", self.id, bytes.len());
        }
    }
}

/// A child process running inside a pty, bridged to a [`SessionConsumer`].
///
/// One session drives exactly one child. Output is pumped to the consumer
/// from a dedicated reader thread; input passed to [`send`](Self::send) is
/// written in call order from a dedicated writer thread.
///
/// Stopping a session never signals the child. Termination of the child is
/// observed only as end of stream (or a read error) on the pty.
pub struct ProcessSession {
    core: Arc<SessionCore>,
    spawner: Box<dyn PtySpawner>,
    env_policy: Box<dyn EnvironmentPolicy>,
    read_buffer_size: usize,
    cwd: Option<PathBuf>,
    start_lock: Mutex<()>,
    pid: Mutex<Option<u32>>,
}

impl ProcessSession {
    /// Create an idle session using the native pty and the inherited
    /// environment.
    pub fn new(consumer: Arc<dyn SessionConsumer>) -> Self {
        Self::builder(consumer).build()
    }

    pub fn builder(consumer: Arc<dyn SessionConsumer>) -> SessionBuilder {
        SessionBuilder::new(consumer)
    }

    /// Returns the session's identifier.
    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn state(&self) -> SessionState {
        self.core.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.core.state.is_running()
    }

    /// Process id of the child, once spawned.
    pub fn pid(&self) -> Option<u32> {
        *lock(&self.pid)
    }

    pub fn stats(&self) -> SessionStats {
        self.core.stats.snapshot()
    }

    /// Spawn `program` with `args` inside a new pty and start pumping.
    ///
    /// Does nothing if the session is already running. `env` replaces the
    /// child environment entirely; `None` uses the session's environment
    /// policy. The consumer's window size is queried once before spawning.
    ///
    /// On spawn failure the session stays idle and `start` may be retried.
    pub fn start(
        &self,
        program: &str,
        args: &[String],
        env: Option<Vec<(String, String)>>,
    ) -> Result<(), SessionError> {
        self.start_in(program, args, env, self.cwd.clone())
    }

    /// [`start`](Self::start) driven by a [`SessionConfig`].
    pub fn start_with(&self, config: &SessionConfig) -> Result<(), SessionError> {
        let cwd = config.cwd.clone().or_else(|| self.cwd.clone());
        self.start_in(&config.program(), &config.args, config.env_pairs(), cwd)
    }

    fn start_in(
        &self,
        program: &str,
        args: &[String],
        env: Option<Vec<(String, String)>>,
        cwd: Option<PathBuf>,
    ) -> Result<(), SessionError> {
        let _starting = lock(&self.start_lock);
        match self.core.state.load() {
            SessionState::Running => return Ok(()),
            SessionState::Terminated => return Err(SessionError::Terminated),
            SessionState::Idle => {}
        }

        let request = SpawnRequest {
            program: program.to_string(),
            args: args.to_vec(),
            env: env.unwrap_or_else(|| self.env_policy.default_environment()),
            cwd,
            size: self.core.consumer.window_size(),
        };

        let SpawnedChild {
            pid,
            reader,
            writer,
            mut control,
        } = self.spawner.spawn(&request).map_err(|e| {
            log::warn!("session {}: spawn of '{program}' failed: {e}", self.core.id);
            SessionError::Spawn(e)
        })?;

        let queue = match WriteQueue::start(Arc::clone(&self.core), writer) {
            Ok(queue) => queue,
            Err(e) => {
                control.kill();
                return Err(SessionError::Thread(e));
            }
        };
        *lock(&self.core.queue) = Some(queue);
        *lock(&self.core.control) = Some(control);
        *lock(&self.pid) = pid;
        self.core.state.store(SessionState::Running);

        if let Err(e) = start_read_pump(Arc::clone(&self.core), reader, self.read_buffer_size) {
            self.abandon_start();
            return Err(SessionError::Thread(e));
        }

        log::debug!(
            "session {}: started '{program}' (pid {pid:?}, {}x{})",
            self.core.id,
            request.size.cols,
            request.size.rows
        );
        Ok(())
    }

    /// Undo a start that spawned a child but could not finish wiring it up.
    ///
    /// The child is killed. The session goes back to `Idle` unless a
    /// concurrent `stop` already moved it to `Terminated`.
    fn abandon_start(&self) {
        lock(&self.core.queue).take();
        let mut control = lock(&self.core.control);
        if let Some(control) = control.as_mut() {
            control.kill();
        }
        if self
            .core
            .state
            .transition(SessionState::Running, SessionState::Idle)
        {
            control.take();
            lock(&self.pid).take();
        } else {
            log::debug!("session {}: start abandoned after stop", self.core.id);
        }
    }

    /// Queue `bytes` for the child and return immediately.
    ///
    /// A no-op unless the session is running. Buffers reach the child in
    /// the order `send` was called.
    pub fn send(&self, bytes: &[u8]) {
        if !self.core.state.is_running() || bytes.is_empty() {
            return;
        }
        self.core.enqueue(bytes);
    }

    /// End the session without signalling the child process.
    ///
    /// The write path is closed, pending writes are discarded, the pty
    /// master is released and `on_process_terminated` fires if it has not
    /// already. A read that is in flight is abandoned; its data is never
    /// delivered.
    ///
    /// On Unix, closing the writer sends a newline and the terminal's EOF
    /// character to the pty, so a shell reading from it usually exits.
    pub fn stop(&self) {
        self.core.terminate("stopped");
    }

    /// Re-query the consumer's window size and apply it to the pty.
    pub fn resize(&self) -> Result<(), SessionError> {
        if !self.core.state.is_running() {
            return Err(SessionError::NotRunning);
        }
        let size = self.core.consumer.window_size();
        let mut control = lock(&self.core.control);
        let control = control.as_mut().ok_or(SessionError::NotRunning)?;
        control.resize(size).map_err(SessionError::Resize)?;
        log::debug!("session {}: resized to {}x{}", self.core.id, size.cols, size.rows);
        Ok(())
    }

    /// Enable (`Some`) or disable (`None`) the per-chunk raw log.
    pub fn set_logging(&self, dir: Option<PathBuf>) {
        self.core.chunk_log.set_dir(dir);
    }

    /// Exit code of the child if it has exited and been reaped.
    ///
    /// Keeps working after termination.
    pub fn exit_code(&self) -> Option<u32> {
        lock(&self.core.control).as_mut().and_then(|control| control.try_wait())
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Configures a [`ProcessSession`] before it is created.
pub struct SessionBuilder {
    consumer: Arc<dyn SessionConsumer>,
    spawner: Box<dyn PtySpawner>,
    env_policy: Box<dyn EnvironmentPolicy>,
    read_buffer_size: usize,
    cwd: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl SessionBuilder {
    fn new(consumer: Arc<dyn SessionConsumer>) -> Self {
        Self {
            consumer,
            spawner: Box::new(NativeSpawner),
            env_policy: Box::new(InheritedEnvironment::default()),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            cwd: None,
            log_dir: None,
        }
    }

    pub fn spawner(mut self, spawner: Box<dyn PtySpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn env_policy(mut self, policy: Box<dyn EnvironmentPolicy>) -> Self {
        self.env_policy = policy;
        self
    }

    /// Capacity of a single read. Clamped to at least one byte.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Apply the session-level parts of `config`: environment policy, read
    /// size, working directory and chunk log.
    pub fn config(mut self, config: &SessionConfig) -> Self {
        self.env_policy = match &config.env_allowlist {
            Some(allowed) => Box::new(AllowlistEnvironment::new(
                allowed.iter().cloned(),
                config.term.clone(),
            )),
            None => Box::new(InheritedEnvironment::new(config.term.clone())),
        };
        self.read_buffer_size = config.read_buffer_size.max(1);
        self.cwd = config.cwd.clone();
        self.log_dir = config.log_dir.clone();
        self
    }

    pub fn build(self) -> ProcessSession {
        ProcessSession {
            core: Arc::new(SessionCore::new(
                self.consumer,
                ChunkLogger::new(self.log_dir),
            )),
            spawner: self.spawner,
            env_policy: self.env_policy,
            read_buffer_size: self.read_buffer_size,
            cwd: self.cwd,
            start_lock: Mutex::new(()),
            pid: Mutex::new(None),
        }
    }
}
