//! The controlling terminal: its size and raw mode.

use std::io::{self, IsTerminal};

use nix::libc;
use nix::pty::Winsize;
use nix::sys::termios::{self, SetArg, Termios};
use tether_pty::WindowSize;

/// Size of the terminal attached to stdout, if there is one.
pub fn window_size() -> Option<WindowSize> {
    let mut ws = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCGWINSZ only writes into the provided winsize struct.
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(WindowSize::with_pixels(
            ws.ws_col,
            ws.ws_row,
            ws.ws_xpixel,
            ws.ws_ypixel,
        ))
    } else {
        None
    }
}

pub fn stdin_is_terminal() -> bool {
    io::stdin().is_terminal()
}

/// RAII guard for raw terminal mode on stdin.
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn new() -> io::Result<Self> {
        let original = termios::tcgetattr(io::stdin()).map_err(io::Error::from)?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &raw).map_err(io::Error::from)?;

        Ok(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &self.original);
    }
}
