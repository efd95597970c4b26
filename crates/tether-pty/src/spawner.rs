use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty};

use crate::error::PtyError;
use crate::size::WindowSize;

/// Everything the spawner needs to start one child inside a fresh pty.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Program to execute. Also used as argv[0].
    pub program: String,
    pub args: Vec<String>,
    /// The complete child environment; nothing is inherited beyond this.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub size: WindowSize,
}

/// Control over a spawned child that is not part of the byte stream.
pub trait ChildControl: Send {
    /// Apply a new window size to the pty.
    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError>;

    /// Poll the child's exit code without blocking.
    ///
    /// Returns `None` while the child is still running or if its status
    /// cannot be determined.
    fn try_wait(&mut self) -> Option<u32>;

    /// Close the master side of the pty. Resizing fails afterwards; the exit
    /// status stays available through [`try_wait`](Self::try_wait).
    fn release_pty(&mut self);

    /// Signal the child to exit. Only used to undo a start that failed
    /// after the child was spawned.
    fn kill(&mut self);
}

/// A live child attached to the master side of a pty.
///
/// Either every handle is valid or the spawn failed as a whole.
pub struct SpawnedChild {
    pub pid: Option<u32>,
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub control: Box<dyn ChildControl>,
}

/// Capability that allocates a pty and starts a program inside it.
pub trait PtySpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChild, PtyError>;
}

/// Spawner backed by the platform pty via `portable-pty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSpawner;

impl PtySpawner for NativeSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChild, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(request.size.into())
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&request.program);
        cmd.args(&request.args);
        cmd.env_clear();
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &request.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(format!("'{}': {e}", request.program)))?;

        // The child holds its own copy of the slave end.
        drop(pair.slave);

        let handles = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(format!("failed to clone reader: {e}")))
            .and_then(|reader| {
                let writer = pair
                    .master
                    .take_writer()
                    .map_err(|e| PtyError::Open(format!("failed to take writer: {e}")))?;
                Ok((reader, writer))
            });
        let (reader, writer) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                kill_child(child.as_mut());
                return Err(e);
            }
        };

        let pid = child.process_id();
        log::debug!("spawned '{}' with pid {pid:?}", request.program);

        Ok(SpawnedChild {
            pid,
            reader,
            writer,
            control: Box::new(NativeControl {
                master: Some(pair.master),
                child,
            }),
        })
    }
}

/// SIGHUP the child and reap it if it is already gone.
fn kill_child(child: &mut (dyn Child + Send + Sync)) {
    if let Err(e) = child.kill() {
        log::warn!("failed to kill child {:?}: {e}", child.process_id());
    }
    let _ = child.try_wait();
}

struct NativeControl {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
}

impl ChildControl for NativeControl {
    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| PtyError::Resize("pty already closed".to_string()))?;
        master
            .resize(size.into())
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    fn release_pty(&mut self) {
        self.master.take();
    }

    fn kill(&mut self) {
        kill_child(self.child.as_mut());
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
