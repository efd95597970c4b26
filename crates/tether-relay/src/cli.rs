//! Command line and config file handling for the relay.
//!
//! Precedence is CLI > config file > defaults. The config file is the
//! `--config` path if given, else `<config dir>/tether/relay.toml` when it
//! exists.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tether_pty::{SessionConfig, STANDARD_ALLOWED_VARS};
use thiserror::Error;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tether-relay")]
#[command(version)]
#[command(about = "Relay the current terminal to a program running in a pty", long_about = None)]
pub struct Cli {
    /// Path to custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write every chunk of child output into DIR
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Program to run instead of the default shell
    #[arg(short, long, value_name = "PROGRAM")]
    pub shell: Option<String>,

    /// Value of TERM for the child
    #[arg(long, value_name = "TERM")]
    pub term: Option<String>,

    /// Pass only a minimal set of environment variables to the child
    #[arg(long)]
    pub clean_env: bool,

    /// Arguments passed to the program
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Cli {
    /// Resolve the session config from the config file and the CLI flags.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut config = match self.config_path() {
            Some(path) => load_from_file(&path)?,
            None => SessionConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        default_config_path().filter(|path| path.exists())
    }

    fn apply(&self, config: &mut SessionConfig) {
        if let Some(shell) = &self.shell {
            config.program = Some(shell.clone());
        }
        if !self.args.is_empty() {
            config.args = self.args.clone();
        }
        if let Some(term) = &self.term {
            config.term = term.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if self.clean_env {
            config.env_allowlist = Some(
                STANDARD_ALLOWED_VARS
                    .iter()
                    .map(|var| var.to_string())
                    .collect(),
            );
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tether").join("relay.toml"))
}

pub fn load_from_file(path: &Path) -> Result<SessionConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
