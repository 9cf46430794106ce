//! Supervised command execution.
//!
//! [`CommandExecutor`] runs one unit of work at a time in a child task.
//! Failures and panics inside the work come back as [`CommandResult::Error`]
//! and never reach the caller as a panic. A second `execute` while one is
//! running waits its turn.

use std::any::Any;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Message carried by the result of an interrupted command.
pub const INTERRUPTED: &str = "interrupted";

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success(String),
    Error(String),
    /// The operator asked to leave
    Quit,
}

impl CommandResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, Self::Quit)
    }

    /// Text to show for this result.
    pub fn message(&self) -> &str {
        match self {
            Self::Success(text) | Self::Error(text) => text,
            Self::Quit => "bye",
        }
    }
}

/// Clears executor state even if the `execute` future is dropped mid-flight.
struct CurrentGuard<'a> {
    executor: &'a CommandExecutor,
    abort: Option<AbortHandle>,
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        *self.executor.lock_current() = None;
        self.executor.executing.store(false, Ordering::Release);
    }
}

/// Runs commands one at a time under a supervising cancellation scope.
#[derive(Debug)]
pub struct CommandExecutor {
    parent: CancellationToken,
    turn: tokio::sync::Mutex<()>,
    current: Mutex<Option<CancellationToken>>,
    executing: AtomicBool,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl CommandExecutor {
    /// Create an executor whose commands are also cancelled with `parent`.
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            turn: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
            executing: AtomicBool::new(false),
        }
    }

    /// Run `work` to completion or cancellation.
    ///
    /// `work` receives the command's cancellation token so long-running
    /// commands can stop cleanly; commands that ignore it are aborted at
    /// their next suspension point.
    pub async fn execute<F, Fut>(&self, work: F) -> CommandResult
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = vigil_core::Result<CommandResult>> + Send + 'static,
    {
        let _turn = self.turn.lock().await;

        let token = self.parent.child_token();
        *self.lock_current() = Some(token.clone());
        self.executing.store(true, Ordering::Release);

        let mut handle = tokio::spawn(work(token.clone()));
        let _guard = CurrentGuard {
            executor: self,
            abort: Some(handle.abort_handle()),
        };

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    debug!(error = %e, "command failed");
                    CommandResult::Error(e.to_string())
                }
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    warn!(panic = %message, "command panicked");
                    CommandResult::Error(format!("command panicked: {message}"))
                }
                Err(_) => CommandResult::Error(INTERRUPTED.to_string()),
            },
            _ = token.cancelled() => {
                handle.abort();
                let _ = (&mut handle).await;
                debug!("command interrupted");
                CommandResult::Error(INTERRUPTED.to_string())
            }
        }
    }

    /// Cancel the running command. Returns false when idle.
    pub fn interrupt(&self) -> bool {
        match self.lock_current().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
