//! Line-oriented modal shell.
//!
//! [`ReplShell`] feeds key presses to a [`ModalCommandInterpreter`], runs
//! submitted commands through one [`CommandExecutor`] and prints their
//! results. `watch` streams live events until interrupted; Ctrl+E switches
//! the stream to the next [`FilterPreset`] without stopping it.

use std::sync::Arc;
use std::time::Instant;

use crossterm::event::KeyEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{EventFeed, FeedItem, FilterPreset, Result, VigilError};

use crate::ansi;
use crate::commands::{Command, CommandDispatcher};
use crate::executor::{CommandExecutor, CommandResult};
use crate::render::format_event;
use crate::repl::{ModalCommandInterpreter, ReplAction};
use crate::terminal::Screen;

/// How the shell ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    /// `quit` / `exit`
    Quit,
    /// Ctrl+C, Ctrl+D, closed input or outside cancellation
    Terminated,
    /// Double Esc
    Emergency,
}

/// The interactive command shell.
pub struct ReplShell {
    interpreter: ModalCommandInterpreter,
    executor: Arc<CommandExecutor>,
    dispatcher: CommandDispatcher,
    feed: Arc<dyn EventFeed>,
    filter_tx: watch::Sender<FilterPreset>,
    cancel: CancellationToken,
}

impl ReplShell {
    pub fn new(
        interpreter: ModalCommandInterpreter,
        dispatcher: CommandDispatcher,
        feed: Arc<dyn EventFeed>,
        cancel: CancellationToken,
    ) -> Self {
        let (filter_tx, _rx) = watch::channel(FilterPreset::default());
        Self {
            interpreter,
            executor: Arc::new(CommandExecutor::new(cancel.clone())),
            dispatcher,
            feed,
            filter_tx,
            cancel,
        }
    }

    /// Filter used by `watch`.
    pub fn filter(&self) -> FilterPreset {
        *self.filter_tx.borrow()
    }

    /// Run until the operator leaves. The screen is restored on every path.
    pub async fn run<S: Screen>(&mut self, screen: &mut S, keys: mpsc::Receiver<KeyEvent>) -> Result<ShellExit> {
        let mut running: Option<JoinHandle<CommandResult>> = None;
        let outcome = self.session(screen, keys, &mut running).await;

        self.executor.interrupt();
        if let Some(handle) = running.take() {
            handle.abort();
        }
        if let Err(e) = screen.restore() {
            warn!(error = %e, "failed to restore terminal");
        }
        info!(?outcome, "shell finished");
        outcome
    }

    async fn session<S: Screen>(
        &mut self,
        screen: &mut S,
        mut keys: mpsc::Receiver<KeyEvent>,
        running: &mut Option<JoinHandle<CommandResult>>,
    ) -> Result<ShellExit> {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        write_line(screen, "VIGIL shell. Type `help` for commands, Esc Esc to leave.")?;
        self.redraw_prompt(screen)?;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(ShellExit::Terminated),
                key = keys.recv() => {
                    let Some(key) = key else {
                        return Ok(ShellExit::Terminated);
                    };
                    let action = self.interpreter.handle_key(key, Instant::now());
                    if let Some(exit) = self.apply(action, screen, running, &out_tx)? {
                        return Ok(exit);
                    }
                }
                Some(line) = out_rx.recv() => {
                    clear_prompt(screen)?;
                    write_line(screen, &line)?;
                }
                joined = async {
                    match running.as_mut() {
                        Some(handle) => handle.await,
                        None => std::future::pending().await,
                    }
                } => {
                    *running = None;
                    self.interpreter.on_command_finished();
                    let result = joined.unwrap_or_else(|e| CommandResult::Error(e.to_string()));
                    // Flush output the command produced before it finished.
                    while let Ok(line) = out_rx.try_recv() {
                        clear_prompt(screen)?;
                        write_line(screen, &line)?;
                    }
                    clear_prompt(screen)?;
                    match result {
                        CommandResult::Quit => return Ok(ShellExit::Quit),
                        CommandResult::Success(text) => write_line(screen, &text)?,
                        CommandResult::Error(text) => write_line(screen, &format!("error: {text}"))?,
                    }
                }
            }
            self.redraw_prompt(screen)?;
        }
    }

    fn apply<S: Screen>(
        &mut self,
        action: ReplAction,
        screen: &mut S,
        running: &mut Option<JoinHandle<CommandResult>>,
        out: &mpsc::Sender<String>,
    ) -> Result<Option<ShellExit>> {
        match action {
            ReplAction::None => {}
            ReplAction::Submit(line) => {
                clear_prompt(screen)?;
                write_line(screen, &format!("{} > {line}", self.interpreter.mode().tag()))?;
                return self.submit(&line, screen, running, out);
            }
            ReplAction::Interrupt => {
                if self.executor.interrupt() {
                    debug!("interrupt requested");
                }
            }
            ReplAction::CycleFilter => {
                let next = self.filter().next();
                self.filter_tx.send_replace(next);
                clear_prompt(screen)?;
                write_line(screen, &format!("filter: {}", next.label()))?;
            }
            ReplAction::EmergencyExit => {
                clear_prompt(screen)?;
                write_line(screen, "emergency exit")?;
                self.cancel.cancel();
                return Ok(Some(ShellExit::Emergency));
            }
            ReplAction::Terminate => return Ok(Some(ShellExit::Terminated)),
        }
        Ok(None)
    }

    fn submit<S: Screen>(
        &mut self,
        line: &str,
        screen: &mut S,
        running: &mut Option<JoinHandle<CommandResult>>,
        out: &mpsc::Sender<String>,
    ) -> Result<Option<ShellExit>> {
        let command = match Command::parse(line) {
            Ok(Command::Quit) => return Ok(Some(ShellExit::Quit)),
            Ok(command) => command,
            Err(e) => {
                write_line(screen, &format!("error: {e}"))?;
                return Ok(None);
            }
        };
        if running.is_some() {
            write_line(screen, "a command is still running (empty Enter interrupts)")?;
            return Ok(None);
        }

        let observational = command.is_observational();
        self.interpreter.on_dispatched(observational);
        let executor = Arc::clone(&self.executor);
        let handle = if observational {
            let feed = Arc::clone(&self.feed);
            let presets = self.filter_tx.subscribe();
            let out = out.clone();
            tokio::spawn(async move {
                executor
                    .execute(move |token| stream_events(feed, presets, out, token))
                    .await
            })
        } else {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                executor
                    .execute(move |token| async move { dispatcher.run(command, token).await })
                    .await
            })
        };
        *running = Some(handle);
        Ok(None)
    }

    fn redraw_prompt<S: Screen>(&self, screen: &mut S) -> Result<()> {
        screen.write_text(&format!("\r{}{}", ansi::CLEAR_LINE, self.interpreter.prompt()))
    }
}

fn clear_prompt<S: Screen>(screen: &mut S) -> Result<()> {
    screen.write_text(&format!("\r{}", ansi::CLEAR_LINE))
}

fn write_line<S: Screen>(screen: &mut S, text: &str) -> Result<()> {
    // Raw mode needs explicit carriage returns.
    let mut out = text.replace('\n', "\r\n");
    out.push_str("\r\n");
    screen.write_text(&out)
}

/// Body of `watch`: forward matching events until cancelled.
async fn stream_events(
    feed: Arc<dyn EventFeed>,
    mut presets: watch::Receiver<FilterPreset>,
    out: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> Result<CommandResult> {
    let stopped = || Ok(CommandResult::Success("stopped watching".to_string()));
    let mut preset = *presets.borrow_and_update();
    let mut subscription = feed.subscribe(preset.filter());
    let banner = format!(
        "watching {} events (Enter to stop, Ctrl+E to change filter)",
        preset.label()
    );
    if out.send(banner).await.is_err() {
        return stopped();
    }

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return stopped(),
            changed = presets.changed() => {
                if changed.is_err() {
                    return stopped();
                }
                preset = *presets.borrow_and_update();
                subscription = feed.subscribe(preset.filter());
                debug!(filter = preset.label(), "watch resubscribed");
                continue;
            }
            item = subscription.next() => match item {
                Some(FeedItem::Event(event)) => format_event(&event),
                Some(FeedItem::Lagged(skipped)) => format!("... {skipped} events skipped"),
                None => return Err(VigilError::FeedClosed),
            },
        };
        if out.send(line).await.is_err() {
            return stopped();
        }
    }
}
