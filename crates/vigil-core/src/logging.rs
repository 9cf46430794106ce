//! Logging infrastructure for VIGIL.
//!
//! Structured logging through the `tracing` ecosystem. While the dashboard or
//! the shell owns the terminal, nothing may be written to stderr, so the
//! console layer is optional and the JSON file log is the primary sink.
//!
//! ## Example
//!
//! ```no_run
//! use vigil_core::logging;
//!
//! let _guard = logging::init_logging(None, false, false).expect("logging init");
//! tracing::info!("VIGIL started");
//! tracing::debug!(agent_id = "planner", "agent focused");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Result, VigilError};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the VIGIL logging system.
///
/// This sets up:
/// - File logging to `~/.vigil/logs/vigil.log` (JSON lines, daily rolling)
/// - Optional console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.vigil/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
/// * `console` - Also log to stderr. Must be false while a full-screen UI runs.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool, console: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| VigilError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "vigil.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vigil={default_level},vigil_core={default_level},vigil_tui={default_level}"
        ))
    });

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_file(verbose)
            .with_line_number(verbose)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| VigilError::internal(format!("logging already initialized: {e}")))?;

    tracing::debug!(log_dir = %log_dir.display(), verbose, console, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Root VIGIL directory, `~/.vigil/`.
pub fn vigil_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".vigil"))
        .ok_or_else(|| VigilError::internal("home directory could not be determined"))
}

/// Get the default log directory path, `~/.vigil/logs/`.
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(vigil_home()?.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_log_dir() {
        // SAFETY: serialised with every other test that touches HOME
        unsafe { std::env::set_var("HOME", "/tmp/vigil-test-home") };
        let dir = default_log_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/vigil-test-home/.vigil/logs"));
    }

    #[test]
    fn test_init_test_logging() {
        init_test_logging();
        init_test_logging();
    }
}
