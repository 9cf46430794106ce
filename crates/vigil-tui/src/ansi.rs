//! Terminal control sequences.
//!
//! Every escape sequence VIGIL writes lives here so the exact bytes can be
//! checked in one place.

/// Switch to the alternate screen buffer.
pub const ENTER_ALT_SCREEN: &str = "\x1b[?1049h";

/// Return to the main screen buffer.
pub const LEAVE_ALT_SCREEN: &str = "\x1b[?1049l";

pub const HIDE_CURSOR: &str = "\x1b[?25l";

pub const SHOW_CURSOR: &str = "\x1b[?25h";

/// Erase the entire current line.
pub const CLEAR_LINE: &str = "\x1b[2K";

/// Erase the whole screen.
pub const CLEAR_SCREEN: &str = "\x1b[2J";

/// Move the cursor to the top-left corner.
pub const CURSOR_HOME: &str = "\x1b[H";

/// Reset colors and attributes.
pub const RESET: &str = "\x1b[0m";

/// Move the cursor to a 1-based `row` and `col`.
pub fn move_to(row: u16, col: u16) -> String {
    format!("\x1b[{};{}H", row.max(1), col.max(1))
}

/// Sequence that hands the terminal back in its normal state.
pub fn restore_sequence() -> String {
    format!("{RESET}{SHOW_CURSOR}{LEAVE_ALT_SCREEN}")
}

/// Sequence that takes over the terminal for the dashboard.
pub fn takeover_sequence() -> String {
    format!("{ENTER_ALT_SCREEN}{HIDE_CURSOR}{CLEAR_SCREEN}{CURSOR_HOME}")
}
