//! Spawn defaults that can be loaded from a config file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::environment::DEFAULT_TERM;
use crate::spawner::default_shell;

/// Default capacity of a single pty read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8_192;

/// Everything needed to build and start a session.
///
/// All fields are optional in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program to run. `None` means the user's default shell.
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Exact child environment. `None` means computed from the parent
    /// environment with `term` as `TERM`.
    pub env: Option<BTreeMap<String, String>>,
    /// Parent variables passed through when `env` is unset. `None` passes
    /// everything.
    pub env_allowlist: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub term: String,
    pub read_buffer_size: usize,
    /// Directory for the raw chunk log. `None` disables it.
    pub log_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// The program to spawn, resolving the default shell if unset.
    pub fn program(&self) -> String {
        self.program.clone().unwrap_or_else(default_shell)
    }

    /// The explicit environment as spawn pairs, if one was configured.
    pub fn env_pairs(&self) -> Option<Vec<(String, String)>> {
        self.env
            .as_ref()
            .map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            env: None,
            env_allowlist: None,
            cwd: None,
            term: DEFAULT_TERM.to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            log_dir: None,
        }
    }
}
