//! View modes and the shared view configuration.
//!
//! [`ViewConfig`] is what the input loop writes and the render loop reads.
//! It is published through [`SharedViewConfig`], which replaces the whole
//! value on every change so a reader never sees half an update.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use vigil_core::AgentId;

use crate::executor::CommandResult;

/// Screens available in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Agent table, vitals and recent significant events
    #[default]
    Dashboard,
    /// Scrolling event log
    EventStream,
    /// Recent memory stores and recalls
    MemoryOps,
    /// Single agent with its activity strip
    AgentFocus,
    /// Key reference
    Help,
    /// `:` command line
    Command,
}

impl ViewMode {
    /// Returns the hotkey character for this mode.
    pub fn hotkey(&self) -> char {
        match self {
            ViewMode::Dashboard => 'd',
            ViewMode::EventStream => 'e',
            ViewMode::MemoryOps => 'm',
            ViewMode::AgentFocus => '#',
            ViewMode::Help => '?',
            ViewMode::Command => ':',
        }
    }

    /// Returns the display title for this mode.
    pub fn title(&self) -> &'static str {
        match self {
            ViewMode::Dashboard => "Dashboard",
            ViewMode::EventStream => "Events",
            ViewMode::MemoryOps => "Memory",
            ViewMode::AgentFocus => "Agent",
            ViewMode::Help => "Help",
            ViewMode::Command => "Command",
        }
    }

    /// Returns the hotkey hint for status bar display.
    pub fn hotkey_hint(&self) -> String {
        format!("[{}] {}", self.hotkey(), self.title())
    }

    /// Modes reachable with a letter hotkey.
    pub const SWITCHABLE: [ViewMode; 3] =
        [ViewMode::Dashboard, ViewMode::EventStream, ViewMode::MemoryOps];

    /// Try to parse a mode from a hotkey character.
    pub fn from_hotkey(key: char) -> Option<ViewMode> {
        match key.to_ascii_lowercase() {
            'd' => Some(ViewMode::Dashboard),
            'e' => Some(ViewMode::EventStream),
            'm' => Some(ViewMode::MemoryOps),
            _ => None,
        }
    }

    /// Returns true for overlay modes that return to a previous screen.
    pub fn is_transient(&self) -> bool {
        matches!(self, ViewMode::Help | ViewMode::Command)
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Dashboard configuration as seen by one render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewConfig {
    pub mode: ViewMode,
    pub verbose_mode: bool,
    pub focused_agent_id: Option<AgentId>,
    pub command_input: String,
    pub show_help: bool,
    /// Screen to return to when Help or Command closes
    pub return_mode: ViewMode,
    /// Transient overlay left by the last command
    pub last_result: Option<CommandResult>,
}

impl ViewConfig {
    /// Switch to a primary screen, closing any overlay.
    pub fn switch_to(&mut self, mode: ViewMode) {
        self.mode = mode;
        self.show_help = false;
        if mode != ViewMode::AgentFocus {
            self.focused_agent_id = None;
        }
    }

    /// Focus `agent_id` in AgentFocus mode.
    pub fn focus(&mut self, agent_id: AgentId) {
        self.focused_agent_id = Some(agent_id);
        self.switch_to(ViewMode::AgentFocus);
    }

    /// Leave AgentFocus for the dashboard.
    pub fn unfocus(&mut self) {
        self.switch_to(ViewMode::Dashboard);
    }

    /// Open the help screen, or close it if open.
    pub fn toggle_help(&mut self) {
        if self.show_help {
            self.show_help = false;
            self.mode = self.return_mode;
        } else {
            if !self.mode.is_transient() {
                self.return_mode = self.mode;
            }
            self.show_help = true;
            self.mode = ViewMode::Help;
        }
    }

    /// Open the `:` command line.
    pub fn open_command(&mut self) {
        if !self.mode.is_transient() {
            self.return_mode = self.mode;
        }
        self.show_help = false;
        self.command_input.clear();
        self.mode = ViewMode::Command;
    }

    /// Close the command line without running anything.
    pub fn close_command(&mut self) {
        self.command_input.clear();
        self.mode = self.return_mode;
    }

    /// Returns true while a command result overlay is showing.
    pub fn has_overlay(&self) -> bool {
        self.last_result.is_some()
    }
}

/// Copy-on-write publication of [`ViewConfig`].
///
/// Cheap to clone; clones publish to the same value.
#[derive(Clone)]
pub struct SharedViewConfig {
    tx: Arc<watch::Sender<Arc<ViewConfig>>>,
    version: Arc<AtomicU64>,
}

impl SharedViewConfig {
    pub fn new(config: ViewConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self {
            tx: Arc::new(tx),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current configuration.
    pub fn snapshot(&self) -> Arc<ViewConfig> {
        Arc::clone(&self.tx.borrow())
    }

    /// Apply `f` to a copy of the current value and publish the copy.
    ///
    /// Returns the newly published value.
    pub fn update<F>(&self, f: F) -> Arc<ViewConfig>
    where
        F: FnOnce(&mut ViewConfig),
    {
        let mut published = None;
        self.tx.send_modify(|current| {
            let mut next = ViewConfig::clone(&**current);
            f(&mut next);
            let next = Arc::new(next);
            *current = Arc::clone(&next);
            published = Some(next);
        });
        self.version.fetch_add(1, Ordering::AcqRel);
        published.unwrap_or_else(|| self.snapshot())
    }

    /// Monotonic count of updates.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Receiver notified on every update.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewConfig>> {
        self.tx.subscribe()
    }
}

impl Default for SharedViewConfig {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

impl fmt::Debug for SharedViewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedViewConfig")
            .field("version", &self.version())
            .field("config", &*self.snapshot())
            .finish()
    }
}
