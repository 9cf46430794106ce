//! Terminal ownership.
//!
//! [`Screen`] is the only way the dashboard and shell touch the terminal.
//! [`CrosstermScreen`] drives a real tty with raw mode and the sequences in
//! [`crate::ansi`]; the key reader thread feeds key presses into a tokio
//! channel so the async loops never block on terminal input.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as TermEvent, KeyEvent, KeyEventKind};
use crossterm::terminal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vigil_core::{Result, VigilError};

use crate::ansi;
use crate::render::Frame;

/// Output side of the terminal.
pub trait Screen: Send {
    /// Current size as `(width, height)`.
    fn size(&self) -> (u16, u16);

    /// Take over the terminal (raw mode, alternate screen, hidden cursor).
    fn enter(&mut self) -> Result<()>;

    /// Paint a whole frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Write text as-is and flush.
    fn write_text(&mut self, text: &str) -> Result<()>;

    /// Hand the terminal back. Safe to call more than once.
    fn restore(&mut self) -> Result<()>;
}

/// Screen on the process's stdout.
pub struct CrosstermScreen {
    out: io::Stdout,
    alt_screen: bool,
    raw: bool,
}

impl CrosstermScreen {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            alt_screen: false,
            raw: false,
        }
    }

    /// Raw mode without the alternate screen, for the line-oriented shell.
    pub fn enter_raw(&mut self) -> Result<()> {
        terminal::enable_raw_mode().map_err(VigilError::terminal_init)?;
        self.raw = true;
        Ok(())
    }

    fn write_flush(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| VigilError::io("writing to", "<stdout>", e))
    }
}

impl Default for CrosstermScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for CrosstermScreen {
    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }

    fn enter(&mut self) -> Result<()> {
        self.enter_raw()?;
        self.write_flush(&ansi::takeover_sequence())
            .map_err(VigilError::terminal_init)?;
        self.alt_screen = true;
        debug!("terminal taken over");
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_flush(&frame.to_ansi())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.write_flush(text)
    }

    fn restore(&mut self) -> Result<()> {
        let mut failure = None;
        if self.alt_screen {
            if let Err(e) = self.write_flush(&ansi::restore_sequence()) {
                failure = Some(e.to_string());
            }
            self.alt_screen = false;
        }
        if self.raw {
            if let Err(e) = terminal::disable_raw_mode() {
                failure = Some(e.to_string());
            }
            self.raw = false;
        }
        match failure {
            Some(message) => Err(VigilError::terminal_restore(message)),
            None => Ok(()),
        }
    }
}

impl Drop for CrosstermScreen {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "terminal restore on drop failed");
        }
    }
}

/// Handle to the background key reader thread.
pub struct KeyReader {
    stop: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl KeyReader {
    /// Start reading key presses from the terminal.
    ///
    /// The thread polls every `poll` so it notices `cancel` promptly, and ends
    /// when `cancel` fires, the receiver is dropped or the terminal errors.
    pub fn spawn(poll: Duration, cancel: &CancellationToken) -> Result<(Self, mpsc::Receiver<KeyEvent>)> {
        let (tx, rx) = mpsc::channel(64);
        let stop = cancel.child_token();
        let token = stop.clone();
        let handle = thread::Builder::new()
            .name("vigil-keys".into())
            .spawn(move || read_keys(poll, &token, &tx))
            .map_err(VigilError::terminal_init)?;
        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("key reader thread panicked");
            }
        }
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_keys(poll: Duration, cancel: &CancellationToken, tx: &mpsc::Sender<KeyEvent>) {
    while !cancel.is_cancelled() {
        match event::poll(poll) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!(error = %e, "terminal poll failed, key reader stopping");
                return;
            }
        }
        match event::read() {
            Ok(TermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                if tx.blocking_send(key).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "terminal read failed, key reader stopping");
                return;
            }
        }
    }
    debug!("key reader stopped");
}
