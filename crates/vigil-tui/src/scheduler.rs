//! The dashboard's two loops.
//!
//! The input loop drains key presses every `input_poll` and turns them into
//! [`ViewConfig`] updates or commands. The render loop builds a frame every
//! `render_interval` and writes it only when it differs from the last frame
//! written. Both loops stop on the same cancellation token, after which
//! [`DashboardScheduler::run`] always performs the same cleanup.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossterm::event::KeyEvent;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_core::{Result, VigilConfig, VigilError};

use crate::commands::{Command, CommandDispatcher};
use crate::event::{AppEvent, InputHandler};
use crate::executor::{CommandExecutor, CommandResult};
use crate::presenter::{ViewState, ViewStatePresenter};
use crate::render::{Frame, FrameRenderer};
use crate::slots::AgentIndexSlotMap;
use crate::terminal::Screen;
use crate::view::{SharedViewConfig, ViewConfig, ViewMode};

/// Consecutive render failures tolerated before the dashboard gives up.
pub const MAX_RENDER_FAILURES: u32 = 5;

type RenderFn = dyn Fn(&ViewConfig, &ViewState, &AgentIndexSlotMap, (u16, u16)) -> Frame + Send + Sync;

/// Loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub input_poll: Duration,
    pub render_interval: Duration,
    pub max_render_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&VigilConfig::default())
    }
}

impl From<&VigilConfig> for SchedulerConfig {
    fn from(config: &VigilConfig) -> Self {
        Self {
            input_poll: config.input_poll(),
            render_interval: config.render_interval(),
            max_render_failures: MAX_RENDER_FAILURES,
        }
    }
}

/// What the render loop remembers between ticks.
#[derive(Debug, Default)]
pub struct RenderCache {
    last_frame: Option<Frame>,
    config_version: Option<u64>,
    failures: u32,
    writes: u64,
}

impl RenderCache {
    /// Frames actually written to the screen.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }
}

/// Drives the dashboard until cancelled.
pub struct DashboardScheduler {
    presenter: Arc<ViewStatePresenter>,
    dispatcher: CommandDispatcher,
    executor: Arc<CommandExecutor>,
    view: SharedViewConfig,
    slots: Mutex<AgentIndexSlotMap>,
    handler: Mutex<InputHandler>,
    render_fn: Box<RenderFn>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl DashboardScheduler {
    pub fn new(
        presenter: Arc<ViewStatePresenter>,
        dispatcher: CommandDispatcher,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let view = SharedViewConfig::new(ViewConfig {
            verbose_mode: presenter.is_verbose(),
            ..ViewConfig::default()
        });
        Self {
            presenter,
            dispatcher,
            executor: Arc::new(CommandExecutor::new(cancel.clone())),
            view,
            slots: Mutex::new(AgentIndexSlotMap::new()),
            handler: Mutex::new(InputHandler::new()),
            render_fn: Box::new(|config, state, slots, (width, height)| {
                FrameRenderer::new(width, height).render(config, state, slots)
            }),
            config,
            cancel,
        }
    }

    /// Replace frame construction.
    pub fn with_render_fn<F>(mut self, render: F) -> Self
    where
        F: Fn(&ViewConfig, &ViewState, &AgentIndexSlotMap, (u16, u16)) -> Frame + Send + Sync + 'static,
    {
        self.render_fn = Box::new(render);
        self
    }

    /// Shared view configuration written by the input loop.
    pub fn view(&self) -> &SharedViewConfig {
        &self.view
    }

    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    /// Ask both loops to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the dashboard on `screen` until cancelled.
    ///
    /// The screen is restored and a final status line written on every
    /// exit path, including render failures.
    pub async fn run<S: Screen>(&self, screen: &mut S, keys: mpsc::Receiver<KeyEvent>) -> Result<()> {
        self.presenter.start();
        let outcome = match screen.enter() {
            Ok(()) => {
                info!("dashboard running");
                let (_, rendered) = tokio::join!(self.input_loop(keys), self.render_loop(screen));
                rendered
            }
            Err(e) => {
                self.cancel.cancel();
                Err(e)
            }
        };
        self.cleanup(screen).await;
        outcome
    }

    async fn cleanup<S: Screen>(&self, screen: &mut S) {
        self.cancel.cancel();
        self.executor.interrupt();
        self.presenter.stop().await;
        if let Err(e) = screen.restore() {
            error!(error = %e, "failed to restore terminal");
        }
        let state = self.presenter.get_view_state();
        let vitals = &state.vitals;
        let line = format!(
            "vigil: {} events seen, {} agents active, {} dropped\n",
            vitals.events_seen, vitals.active_agents, vitals.dropped_events
        );
        if let Err(e) = screen.write_text(&line) {
            warn!(error = %e, "failed to write final status line");
        }
        info!("dashboard stopped");
    }

    async fn input_loop(&self, mut keys: mpsc::Receiver<KeyEvent>) {
        let mut ticker = tokio::time::interval(self.config.input_poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            while let Ok(key) = keys.try_recv() {
                self.handle_key(key);
                if self.cancel.is_cancelled() {
                    break;
                }
            }
        }
        debug!("input loop exited");
    }

    async fn render_loop<S: Screen>(&self, screen: &mut S) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.render_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cache = RenderCache::default();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.render_tick(screen, &mut cache) {
                error!(error = %e, "render loop stopping");
                self.cancel.cancel();
                return Err(e);
            }
        }
        debug!(writes = cache.writes, "render loop exited");
        Ok(())
    }

    /// Route one key press.
    pub fn handle_key(&self, key: KeyEvent) {
        if self.view.snapshot().has_overlay() {
            self.view.update(|c| c.last_result = None);
            return;
        }

        let event = self.lock_handler().handle_key(key);
        match event {
            AppEvent::SwitchMode(mode) => {
                self.view.update(|c| c.switch_to(mode));
            }
            AppEvent::FocusIndex(index) => self.focus_index(index),
            AppEvent::ToggleVerbose => {
                let config = self.view.update(|c| c.verbose_mode = !c.verbose_mode);
                self.presenter.set_verbose(config.verbose_mode);
            }
            AppEvent::ToggleHelp => {
                self.view.update(ViewConfig::toggle_help);
            }
            AppEvent::OpenCommand => {
                self.view.update(ViewConfig::open_command);
            }
            AppEvent::Cancel => self.cancel_current(),
            AppEvent::Quit | AppEvent::ForceQuit => {
                info!("quit requested");
                self.cancel.cancel();
            }
            AppEvent::TextInput(ch) => {
                self.view.update(|c| c.command_input.push(ch));
            }
            AppEvent::Backspace => {
                self.view.update(|c| {
                    c.command_input.pop();
                });
            }
            AppEvent::Submit => {
                let mut line = String::new();
                self.view.update(|c| {
                    line = std::mem::take(&mut c.command_input);
                    c.close_command();
                });
                self.submit(&line);
            }
            AppEvent::None => {}
        }
    }

    fn focus_index(&self, index: u8) {
        let state = self.presenter.get_view_state();
        let agent = {
            let mut slots = self.lock_slots();
            slots.update(&state.agent_states);
            slots.agent_at(index).cloned()
        };
        match agent {
            Some(agent_id) => {
                debug!(index, agent_id = %agent_id, "focusing agent");
                self.view.update(|c| c.focus(agent_id));
            }
            None => {
                debug!(index, "no agent in slot");
                self.view.update(ViewConfig::unfocus);
            }
        }
    }

    fn cancel_current(&self) {
        if self.executor.interrupt() {
            debug!("interrupted running command");
        }
        let mode = self.view.snapshot().mode;
        match mode {
            ViewMode::Command => {
                self.view.update(ViewConfig::close_command);
            }
            ViewMode::Help => {
                self.view.update(ViewConfig::toggle_help);
            }
            ViewMode::AgentFocus => {
                self.view.update(ViewConfig::unfocus);
            }
            ViewMode::Dashboard | ViewMode::EventStream | ViewMode::MemoryOps => {}
        }
    }

    fn submit(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.view
                    .update(|c| c.last_result = Some(CommandResult::Error(e.to_string())));
                return;
            }
        };
        match command {
            Command::Quit => {
                info!("quit command");
                self.cancel.cancel();
            }
            Command::Watch => {
                self.view.update(|c| c.switch_to(ViewMode::EventStream));
            }
            command => {
                let executor = Arc::clone(&self.executor);
                let dispatcher = self.dispatcher.clone();
                let view = self.view.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let result = executor
                        .execute(move |token| async move { dispatcher.run(command, token).await })
                        .await;
                    if result.is_quit() {
                        cancel.cancel();
                        return;
                    }
                    view.update(|c| c.last_result = Some(result));
                });
            }
        }
    }

    /// Build the current frame and write it if anything changed.
    ///
    /// Returns whether the screen was written. Fails only on a write error or
    /// once rendering has failed too many times in a row.
    pub fn render_tick<S: Screen>(&self, screen: &mut S, cache: &mut RenderCache) -> Result<bool> {
        let state = self.presenter.get_view_state();
        let focus_lost = {
            let mut slots = self.lock_slots();
            slots.update(&state.agent_states);
            let config = self.view.snapshot();
            config.mode == ViewMode::AgentFocus
                && config
                    .focused_agent_id
                    .as_deref()
                    .is_none_or(|id| !slots.is_agent_active(id))
        };
        if focus_lost {
            info!("focused agent went inactive, back to dashboard");
            self.view.update(ViewConfig::unfocus);
        }

        let version = self.view.version();
        if cache.config_version != Some(version) {
            cache.last_frame = None;
            cache.config_version = Some(version);
        }
        let config = self.view.snapshot();
        let slots = self.lock_slots().clone();
        let size = screen.size();

        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            (self.render_fn)(&config, &state, &slots, size)
        }));
        let frame = match built {
            Ok(frame) => {
                cache.failures = 0;
                frame
            }
            Err(payload) => {
                cache.failures += 1;
                let message = panic_message(payload.as_ref());
                error!(failures = cache.failures, panic = %message, "frame construction panicked");
                if cache.failures >= self.config.max_render_failures {
                    return Err(VigilError::Render {
                        failures: cache.failures,
                        message,
                    });
                }
                FrameRenderer::new(size.0, size.1).error_frame(&message)
            }
        };

        if cache.last_frame.as_ref() == Some(&frame) {
            return Ok(false);
        }
        screen.write_frame(&frame)?;
        cache.last_frame = Some(frame);
        cache.writes += 1;
        Ok(true)
    }

    fn lock_slots(&self) -> MutexGuard<'_, AgentIndexSlotMap> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_handler(&self) -> MutexGuard<'_, InputHandler> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
