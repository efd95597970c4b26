//! Optional raw-traffic log: one file per received chunk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Persists received chunks into a directory, one numbered file each.
///
/// The counter is per logger (and therefore per session) and keeps
/// increasing across enable/disable cycles, so files are never overwritten.
#[derive(Debug, Default)]
pub struct ChunkLogger {
    dir: Mutex<Option<PathBuf>>,
    next_index: AtomicU64,
}

impl ChunkLogger {
    pub fn new(dir: Option<PathBuf>) -> Self {
        let logger = Self::default();
        logger.set_dir(dir);
        logger
    }

    /// Enable logging into `dir`, or disable it with `None`.
    pub fn set_dir(&self, dir: Option<PathBuf>) {
        if let Some(dir) = &dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::warn!("cannot create chunk log dir {}: {e}", dir.display());
            }
        }
        if let Ok(mut current) = self.dir.lock() {
            *current = dir;
        }
    }

    pub fn dir(&self) -> Option<PathBuf> {
        self.dir.lock().ok().and_then(|dir| dir.clone())
    }

    /// Write `chunk` to the next numbered file.
    ///
    /// Returns `Ok(None)` when logging is disabled.
    pub fn record(&self, chunk: &[u8]) -> io::Result<Option<PathBuf>> {
        let Some(dir) = self.dir() else {
            return Ok(None);
        };
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let path = chunk_path(&dir, index);
        std::fs::write(&path, chunk)?;
        Ok(Some(path))
    }
}

/// Path of the log file for chunk number `index` inside `dir`.
pub fn chunk_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("chunk.{index:06}"))
}
