//! Terminal dashboard and modal shell for VIGIL.
//!
//! ## Features
//!
//! - Live dashboard fed by the event stream, redrawn only when it changes
//! - Agent focus by stable number-key slots
//! - Event stream and memory operation views
//! - `:` command line and a modal shell sharing one command grammar
//! - Escalation answers routed back through the request/response registry
//!
//! ## Hotkeys
//!
//! - `d` - Dashboard
//! - `e` - Event stream
//! - `m` - Memory operations
//! - `1`-`9` - Focus agent
//! - `v` - Toggle verbose
//! - `:` - Command line
//! - `?` or `h` - Help
//! - `Esc` - Cancel/back
//! - `q` or `Ctrl+C` - Quit

pub mod ansi;
pub mod commands;
pub mod event;
pub mod executor;
pub mod presenter;
pub mod render;
pub mod repl;
pub mod scheduler;
pub mod shell;
pub mod slots;
pub mod terminal;
pub mod view;

#[cfg(test)]
mod integration_tests;

pub use commands::{Command, CommandDispatcher};
pub use executor::{CommandExecutor, CommandResult};
pub use presenter::{AgentState, PresenterConfig, ViewState, ViewStatePresenter, Vitals};
pub use render::{Frame, FrameRenderer};
pub use repl::{ModalCommandInterpreter, ReplAction, ReplMode};
pub use scheduler::{DashboardScheduler, SchedulerConfig};
pub use shell::{ReplShell, ShellExit};
pub use slots::AgentIndexSlotMap;
pub use terminal::{CrosstermScreen, KeyReader, Screen};
pub use view::{SharedViewConfig, ViewConfig, ViewMode};
