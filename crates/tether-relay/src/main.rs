//! tether-relay
//!
//! Runs a program in a pty and relays the current terminal to it: stdin is
//! sent to the child, child output is copied to stdout.

mod cli;
mod terminal;

use std::error::Error;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tether_pty::{EventChannel, ProcessSession, SessionEvent};

use crate::cli::Cli;
use crate::terminal::RawModeGuard;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tether-relay: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = cli.session_config()?;
    let size = terminal::window_size().unwrap_or_default();
    log::info!(
        "Starting {} ({}x{})",
        config.program(),
        size.cols,
        size.rows
    );

    let (channel, mut events) = EventChannel::new(size);
    let session = Arc::new(ProcessSession::builder(channel).config(&config).build());
    session.start_with(&config)?;
    log::info!("Child PID: {:?}", session.pid());

    let _raw_guard = if terminal::stdin_is_terminal() {
        Some(RawModeGuard::new()?)
    } else {
        None
    };

    spawn_stdin_pump(Arc::clone(&session))?;

    let mut stdout = io::stdout().lock();
    while let Some(event) = events.blocking_recv() {
        match event {
            SessionEvent::Data(bytes) => {
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            SessionEvent::Terminated => break,
        }
    }

    let stats = session.stats();
    log::info!(
        "Session finished: {} bytes read, {} bytes written",
        stats.bytes_read,
        stats.bytes_written
    );

    Ok(wait_exit_code(&session))
}

/// Forward stdin to the session until stdin closes or the session ends.
fn spawn_stdin_pump(session: Arc<ProcessSession>) -> io::Result<()> {
    thread::Builder::new()
        .name("tether-stdin".to_string())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buf = [0u8; 4096];
            while session.is_running() {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => session.send(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        log::warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
            log::debug!("stdin pump exited");
        })?;
    Ok(())
}

/// The child usually exits just after its side of the pty closes.
fn wait_exit_code(session: &ProcessSession) -> ExitCode {
    let deadline = Instant::now() + Duration::from_millis(500);
    loop {
        if let Some(code) = session.exit_code() {
            return ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX));
        }
        if Instant::now() > deadline {
            log::debug!("Child exit status not available");
            return ExitCode::SUCCESS;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
