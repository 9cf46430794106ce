//! Dashboard key handling.
//!
//! Converts key presses into [`AppEvent`]s for the scheduler's input loop.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::view::ViewMode;

/// Application-level events that can trigger state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Switch to a primary view
    SwitchMode(ViewMode),
    /// Focus the agent in slot 1-9
    FocusIndex(u8),
    /// Include routine events in the recent list
    ToggleVerbose,
    ToggleHelp,
    /// Open the `:` command line
    OpenCommand,
    /// Close an overlay or leave the command line
    Cancel,
    /// Request application quit
    Quit,
    /// Force quit (Ctrl+C)
    ForceQuit,
    /// Text input character
    TextInput(char),
    /// Backspace in the command line
    Backspace,
    /// Run the command line
    Submit,
    /// No action needed
    None,
}

/// Input handler for converting key events to app events.
#[derive(Debug, Default)]
pub struct InputHandler {
    command_mode: bool,
}

impl InputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the command line is taking input.
    pub fn set_command_mode(&mut self, active: bool) {
        self.command_mode = active;
    }

    pub fn is_command_mode(&self) -> bool {
        self.command_mode
    }

    /// Handle a key event and return the corresponding app event.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppEvent {
        // Ctrl+C always force quits
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return AppEvent::ForceQuit;
        }

        if key.code == KeyCode::Esc {
            self.command_mode = false;
            return AppEvent::Cancel;
        }

        if self.command_mode {
            return self.handle_command_input(key);
        }

        self.handle_normal_mode(key)
    }

    fn handle_command_input(&mut self, key: KeyEvent) -> AppEvent {
        match key.code {
            KeyCode::Enter => {
                self.command_mode = false;
                AppEvent::Submit
            }
            KeyCode::Backspace => AppEvent::Backspace,
            KeyCode::Char(c) => AppEvent::TextInput(c),
            _ => AppEvent::None,
        }
    }

    fn handle_normal_mode(&mut self, key: KeyEvent) -> AppEvent {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => AppEvent::Quit,
            KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Char('H') => AppEvent::ToggleHelp,
            KeyCode::Char('v') | KeyCode::Char('V') => AppEvent::ToggleVerbose,
            KeyCode::Char(':') => {
                self.command_mode = true;
                AppEvent::OpenCommand
            }
            KeyCode::Char(c @ '1'..='9') => AppEvent::FocusIndex(c as u8 - b'0'),
            KeyCode::Char(c) => ViewMode::from_hotkey(c).map_or(AppEvent::None, AppEvent::SwitchMode),
            _ => AppEvent::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_view_hotkeys() {
        let mut handler = InputHandler::new();
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('d'))),
            AppEvent::SwitchMode(ViewMode::Dashboard)
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('e'))),
            AppEvent::SwitchMode(ViewMode::EventStream)
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('M'))),
            AppEvent::SwitchMode(ViewMode::MemoryOps)
        );
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('x'))), AppEvent::None);
    }

    #[test]
    fn test_digits_focus_slots() {
        let mut handler = InputHandler::new();
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('1'))), AppEvent::FocusIndex(1));
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('9'))), AppEvent::FocusIndex(9));
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('0'))), AppEvent::None);
    }

    #[test]
    fn test_command_mode_input() {
        let mut handler = InputHandler::new();
        assert_eq!(handler.handle_key(key_event(KeyCode::Char(':'))), AppEvent::OpenCommand);
        assert!(handler.is_command_mode());

        // Hotkeys are plain text while typing.
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('q'))), AppEvent::TextInput('q'));
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('1'))), AppEvent::TextInput('1'));
        assert_eq!(handler.handle_key(key_event(KeyCode::Backspace)), AppEvent::Backspace);
        assert_eq!(handler.handle_key(key_event(KeyCode::Enter)), AppEvent::Submit);
        assert!(!handler.is_command_mode());
    }

    #[test]
    fn test_escape_leaves_command_mode() {
        let mut handler = InputHandler::new();
        handler.set_command_mode(true);
        assert_eq!(handler.handle_key(key_event(KeyCode::Esc)), AppEvent::Cancel);
        assert!(!handler.is_command_mode());
    }

    #[test]
    fn test_ctrl_c_force_quit() {
        let mut handler = InputHandler::new();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handler.handle_key(ctrl_c), AppEvent::ForceQuit);

        handler.set_command_mode(true);
        assert_eq!(handler.handle_key(ctrl_c), AppEvent::ForceQuit);
    }

    #[test]
    fn test_help_verbose_and_quit() {
        let mut handler = InputHandler::new();
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('?'))), AppEvent::ToggleHelp);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('h'))), AppEvent::ToggleHelp);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('v'))), AppEvent::ToggleVerbose);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('Q'))), AppEvent::Quit);
    }
}
