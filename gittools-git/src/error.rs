//! Git executor errors.

use std::time::Duration;
use thiserror::Error;

/// Errors from running git.
#[derive(Debug, Error)]
pub enum GitError {
    /// Bad options or a rejected URL. Never retried.
    #[error("{0}")]
    Config(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation exceeded its time budget.
    #[error("git {op} timed out after {timeout:?}")]
    Timeout {
        /// Git subcommand or high-level operation.
        op: String,
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// Git exited unsuccessfully.
    #[error("git {op} failed: {message}")]
    Command {
        /// Git subcommand.
        op: String,
        /// Exit status and captured output, with credentials scrubbed.
        message: String,
    },

    /// A retryable failure kept happening.
    #[error("git {op} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Git subcommand.
        op: String,
        /// Attempts made.
        attempts: u32,
        /// Message of the final failure.
        last: String,
    },

    /// The git executable is not on PATH.
    #[error("git executable not found on PATH")]
    NotFound,

    /// A URL could not be parsed or rewritten.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Filesystem or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Git subcommand the error belongs to, when known.
    pub fn op(&self) -> Option<&str> {
        match self {
            Self::Timeout { op, .. }
            | Self::Command { op, .. }
            | Self::RetriesExhausted { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Returns true for cancellation and timeouts.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }
}
