//! Modal command-line state machine.
//!
//! Three modes, in the spirit of a modal editor:
//!
//! | Mode | Key | Result |
//! |------|-----|--------|
//! | Normal | `w` `s` `t` `o` | submit `watch`, `status`, `tickets`, `pending` |
//! | Normal | `i` `a` Enter | enter Insert |
//! | Insert | text + Enter | submit the line |
//! | Insert | empty Enter while executing | interrupt |
//! | Observing | Enter | interrupt, back to Insert |
//! | Observing | Ctrl+E | cycle the event filter |
//! | any | Ctrl+D | Observing: interrupt and Insert; otherwise terminate |
//! | any | Ctrl+C | terminate |
//! | any | Esc | Normal; a second Esc within the threshold is an emergency exit |
//!
//! The interpreter is pure: the caller passes the time of every key press,
//! which keeps the double-escape window testable.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

/// Default double-escape window.
pub const DEFAULT_DOUBLE_ESCAPE: Duration = Duration::from_millis(300);

/// Input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplMode {
    Normal,
    #[default]
    Insert,
    Observing,
}

impl ReplMode {
    /// Prompt tag shown before the input line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Normal => "[N]",
            Self::Insert => "[I]",
            Self::Observing => "[O]",
        }
    }
}

/// What the caller should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplAction {
    None,
    /// Run this command line
    Submit(String),
    /// Cancel the running command
    Interrupt,
    /// Move to the next event filter preset
    CycleFilter,
    /// Double Esc: leave immediately
    EmergencyExit,
    /// Ctrl+C, or Ctrl+D outside Observing
    Terminate,
}

/// Turns key presses into command strings.
#[derive(Debug, Clone)]
pub struct ModalCommandInterpreter {
    mode: ReplMode,
    buffer: String,
    executing: bool,
    last_escape: Option<Instant>,
    double_escape: Duration,
}

impl Default for ModalCommandInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_DOUBLE_ESCAPE)
    }
}

impl ModalCommandInterpreter {
    pub fn new(double_escape: Duration) -> Self {
        Self {
            mode: ReplMode::Insert,
            buffer: String::new(),
            executing: false,
            last_escape: None,
            double_escape,
        }
    }

    pub fn mode(&self) -> ReplMode {
        self.mode
    }

    /// Text typed so far in Insert mode.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Prompt for the current mode, including the typed text.
    pub fn prompt(&self) -> String {
        match self.mode {
            ReplMode::Insert => format!("{} > {}", self.mode.tag(), self.buffer),
            _ => format!("{} > ", self.mode.tag()),
        }
    }

    /// Tell the interpreter whether a command is running.
    pub fn set_executing(&mut self, executing: bool) {
        self.executing = executing;
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// A submitted command was dispatched. Observational commands switch
    /// to Observing.
    pub fn on_dispatched(&mut self, observational: bool) {
        self.executing = true;
        if observational {
            self.mode = ReplMode::Observing;
        }
    }

    /// The running command finished.
    pub fn on_command_finished(&mut self) {
        self.executing = false;
        if self.mode == ReplMode::Observing {
            self.mode = ReplMode::Insert;
        }
    }

    /// Handle one key press at time `now`.
    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> ReplAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if key.code == KeyCode::Esc {
            return self.handle_escape(now);
        }
        self.last_escape = None;

        if ctrl {
            match key.code {
                KeyCode::Char('c') => return ReplAction::Terminate,
                KeyCode::Char('d') => {
                    return if self.mode == ReplMode::Observing {
                        self.mode = ReplMode::Insert;
                        ReplAction::Interrupt
                    } else {
                        ReplAction::Terminate
                    };
                }
                _ => {}
            }
        }

        match self.mode {
            ReplMode::Normal => self.handle_normal(key),
            ReplMode::Insert => self.handle_insert(key, ctrl),
            ReplMode::Observing => self.handle_observing(key, ctrl),
        }
    }

    fn handle_escape(&mut self, now: Instant) -> ReplAction {
        let is_double = self
            .last_escape
            .is_some_and(|prev| now.saturating_duration_since(prev) < self.double_escape);
        if is_double {
            self.last_escape = None;
            debug!("double escape");
            return ReplAction::EmergencyExit;
        }
        self.last_escape = Some(now);
        self.mode = ReplMode::Normal;
        ReplAction::None
    }

    fn handle_normal(&mut self, key: KeyEvent) -> ReplAction {
        match key.code {
            KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => {
                self.mode = ReplMode::Insert;
                ReplAction::None
            }
            KeyCode::Char(c) => match shortcut(c) {
                Some(command) => ReplAction::Submit(command.to_string()),
                None => ReplAction::None,
            },
            _ => ReplAction::None,
        }
    }

    fn handle_insert(&mut self, key: KeyEvent, ctrl: bool) -> ReplAction {
        match key.code {
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.buffer);
                let line = line.trim();
                if !line.is_empty() {
                    ReplAction::Submit(line.to_string())
                } else if self.executing {
                    ReplAction::Interrupt
                } else {
                    ReplAction::None
                }
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                ReplAction::None
            }
            KeyCode::Char('u') if ctrl => {
                self.buffer.clear();
                ReplAction::None
            }
            KeyCode::Char(c) if !ctrl => {
                self.buffer.push(c);
                ReplAction::None
            }
            _ => ReplAction::None,
        }
    }

    fn handle_observing(&mut self, key: KeyEvent, ctrl: bool) -> ReplAction {
        match key.code {
            KeyCode::Enter => {
                self.mode = ReplMode::Insert;
                ReplAction::Interrupt
            }
            KeyCode::Char('e') if ctrl => ReplAction::CycleFilter,
            _ => ReplAction::None,
        }
    }
}

/// Normal-mode single-letter shortcuts.
pub fn shortcut(key: char) -> Option<&'static str> {
    match key {
        'w' => Some("watch"),
        's' => Some("status"),
        't' => Some("tickets"),
        'o' => Some("pending"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_line(repl: &mut ModalCommandInterpreter, text: &str, now: Instant) {
        for c in text.chars() {
            repl.handle_key(key(KeyCode::Char(c)), now);
        }
    }

    #[test]
    fn test_starts_in_insert() {
        let repl = ModalCommandInterpreter::default();
        assert_eq!(repl.mode(), ReplMode::Insert);
        assert_eq!(repl.prompt(), "[I] > ");
    }

    #[test]
    fn test_insert_submits_line() {
        let mut repl = ModalCommandInterpreter::default();
        let now = Instant::now();
        type_line(&mut repl, "ticket T-12", now);
        repl.handle_key(key(KeyCode::Backspace), now);
        assert_eq!(repl.buffer(), "ticket T-1");
        assert_eq!(
            repl.handle_key(key(KeyCode::Enter), now),
            ReplAction::Submit("ticket T-1".into())
        );
        assert_eq!(repl.buffer(), "");
        assert_eq!(repl.mode(), ReplMode::Insert);
    }

    #[test]
    fn test_empty_enter_interrupts_only_while_executing() {
        let mut repl = ModalCommandInterpreter::default();
        let now = Instant::now();
        assert_eq!(repl.handle_key(key(KeyCode::Enter), now), ReplAction::None);

        repl.on_dispatched(false);
        assert_eq!(repl.mode(), ReplMode::Insert);
        assert_eq!(repl.handle_key(key(KeyCode::Enter), now), ReplAction::Interrupt);
        assert_eq!(repl.mode(), ReplMode::Insert);
    }

    #[test]
    fn test_normal_mode_shortcuts() {
        let mut repl = ModalCommandInterpreter::default();
        let t0 = Instant::now();
        repl.handle_key(key(KeyCode::Esc), t0);
        assert_eq!(repl.mode(), ReplMode::Normal);

        let later = t0 + Duration::from_secs(1);
        assert_eq!(
            repl.handle_key(key(KeyCode::Char('s')), later),
            ReplAction::Submit("status".into())
        );
        assert_eq!(
            repl.handle_key(key(KeyCode::Char('o')), later),
            ReplAction::Submit("pending".into())
        );
        assert_eq!(repl.mode(), ReplMode::Normal);
        assert_eq!(repl.handle_key(key(KeyCode::Char('z')), later), ReplAction::None);

        repl.handle_key(key(KeyCode::Char('i')), later);
        assert_eq!(repl.mode(), ReplMode::Insert);
    }

    #[test]
    fn test_observing_transitions() {
        let mut repl = ModalCommandInterpreter::default();
        let now = Instant::now();
        repl.on_dispatched(true);
        assert_eq!(repl.mode(), ReplMode::Observing);
        assert_eq!(repl.prompt(), "[O] > ");

        assert_eq!(repl.handle_key(ctrl('e'), now), ReplAction::CycleFilter);
        assert_eq!(repl.mode(), ReplMode::Observing);

        assert_eq!(repl.handle_key(key(KeyCode::Enter), now), ReplAction::Interrupt);
        assert_eq!(repl.mode(), ReplMode::Insert);
    }

    #[test]
    fn test_ctrl_d_depends_on_mode() {
        let mut repl = ModalCommandInterpreter::default();
        let now = Instant::now();
        repl.on_dispatched(true);
        assert_eq!(repl.handle_key(ctrl('d'), now), ReplAction::Interrupt);
        assert_eq!(repl.mode(), ReplMode::Insert);
        assert_eq!(repl.handle_key(ctrl('d'), now), ReplAction::Terminate);
        assert_eq!(repl.handle_key(ctrl('c'), now), ReplAction::Terminate);
    }

    #[test]
    fn test_finished_observation_returns_to_insert() {
        let mut repl = ModalCommandInterpreter::default();
        repl.on_dispatched(true);
        repl.on_command_finished();
        assert_eq!(repl.mode(), ReplMode::Insert);
        assert!(!repl.is_executing());
    }

    #[test]
    fn test_double_escape_within_threshold_exits() {
        let mut repl = ModalCommandInterpreter::new(Duration::from_millis(300));
        let t0 = Instant::now();
        assert_eq!(repl.handle_key(key(KeyCode::Esc), t0), ReplAction::None);
        assert_eq!(
            repl.handle_key(key(KeyCode::Esc), t0 + Duration::from_millis(120)),
            ReplAction::EmergencyExit
        );
    }

    #[test]
    fn test_slow_escapes_do_not_exit() {
        let mut repl = ModalCommandInterpreter::new(Duration::from_millis(300));
        let t0 = Instant::now();
        assert_eq!(repl.handle_key(key(KeyCode::Esc), t0), ReplAction::None);
        assert_eq!(repl.mode(), ReplMode::Normal);

        repl.handle_key(key(KeyCode::Char('i')), t0 + Duration::from_millis(50));
        assert_eq!(repl.mode(), ReplMode::Insert);

        assert_eq!(
            repl.handle_key(key(KeyCode::Esc), t0 + Duration::from_millis(900)),
            ReplAction::None
        );
        assert_eq!(repl.mode(), ReplMode::Normal);
        assert_eq!(
            repl.handle_key(key(KeyCode::Esc), t0 + Duration::from_millis(1500)),
            ReplAction::None
        );
        assert_eq!(repl.mode(), ReplMode::Normal);
    }

    #[test]
    fn test_key_between_escapes_breaks_the_pair() {
        let mut repl = ModalCommandInterpreter::new(Duration::from_millis(300));
        let t0 = Instant::now();
        repl.handle_key(key(KeyCode::Esc), t0);
        repl.handle_key(key(KeyCode::Char('x')), t0 + Duration::from_millis(50));
        assert_eq!(
            repl.handle_key(key(KeyCode::Esc), t0 + Duration::from_millis(100)),
            ReplAction::None
        );
    }
}
