//! Error types for VIGIL operations.
//!
//! This module defines [`VigilError`], the error enum shared by every VIGIL
//! crate. Errors are meant to be shown to the operator: the dashboard turns
//! them into transient overlays, so every message is short and actionable.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`VigilError`].
pub type Result<T> = std::result::Result<T, VigilError>;

/// Error type for all VIGIL operations.
///
/// Cancellation and escalation timeouts are deliberately absent: both are
/// normal control flow, not failures.
#[derive(Debug, Error)]
pub enum VigilError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file is not valid YAML or has the wrong shape
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Event Stream Errors
    // =========================================================================
    /// An event failed validation and was dropped
    #[error("Malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: String, reason: String },

    /// Event type name not recognised
    #[error("Unknown event type: {name}")]
    UnknownEventKind { name: String },

    /// The event feed was closed by the runtime
    #[error("Event feed closed")]
    FeedClosed,

    // =========================================================================
    // Escalation Errors
    // =========================================================================
    /// No escalation is waiting on this request id
    #[error("No pending escalation with id {request_id}")]
    EscalationNotFound { request_id: String },

    // =========================================================================
    // Action Service Errors
    // =========================================================================
    /// Ticket lookup failed
    #[error("Ticket not found: {ticket_id}")]
    TicketNotFound { ticket_id: String },

    /// Thread lookup failed
    #[error("Thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    /// Agent lookup failed
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    /// The runtime rejected an action
    #[error("{action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    // =========================================================================
    // Command Errors
    // =========================================================================
    /// Command verb is not part of the grammar
    #[error("Unknown command: {verb}")]
    UnknownCommand { verb: String },

    /// Command was recognised but its arguments were not
    #[error("Usage: {usage}")]
    CommandUsage { usage: &'static str },

    // =========================================================================
    // Terminal Errors
    // =========================================================================
    /// Terminal initialization failed
    #[error("Terminal initialization failed: {message}")]
    TerminalInit { message: String },

    /// Terminal restore failed
    #[error("Failed to restore terminal: {message}")]
    TerminalRestore { message: String },

    /// Frame construction kept failing
    #[error("Rendering failed {failures} times in a row: {message}")]
    Render { failures: u32, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in VIGIL)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VigilError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a malformed event error
    pub fn malformed(event_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event_id: event_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an action failure
    pub fn action_failed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Create a terminal init error from any displayable cause
    pub fn terminal_init(cause: impl std::fmt::Display) -> Self {
        Self::TerminalInit {
            message: cause.to_string(),
        }
    }

    /// Create a terminal restore error from any displayable cause
    pub fn terminal_restore(cause: impl std::fmt::Display) -> Self {
        Self::TerminalRestore {
            message: cause.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this error is recoverable (the session keeps running)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedEvent { .. }
                | Self::FeedClosed
                | Self::EscalationNotFound { .. }
                | Self::TicketNotFound { .. }
                | Self::ThreadNotFound { .. }
                | Self::AgentNotFound { .. }
                | Self::ActionFailed { .. }
                | Self::UnknownEventKind { .. }
                | Self::UnknownCommand { .. }
                | Self::CommandUsage { .. }
        )
    }

    /// Returns true if this error is fatal (should exit application)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TerminalInit { .. } | Self::Render { .. } | Self::Internal { .. }
        )
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in ~/.vigil/config.yaml"),
            Self::ConfigValidation { .. } => {
                Some("Intervals and capacities in ~/.vigil/config.yaml must be greater than zero")
            }
            Self::UnknownCommand { .. } => Some("Type 'help' to list available commands"),
            Self::EscalationNotFound { .. } => Some("Type 'pending' to list open escalations"),
            Self::TerminalInit { .. } => Some("Try running in a different terminal"),
            Self::Render { .. } => Some("Check ~/.vigil/logs/ for details"),
            _ => None,
        }
    }
}
