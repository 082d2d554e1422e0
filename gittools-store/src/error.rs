//! Store error types.

use std::time::Duration;
use thiserror::Error;

use gittools_core::TokenError;

/// Errors from loading or saving settings.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors from refreshing a stored token.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The current token could not be read from storage.
    #[error("failed to retrieve current token: {0}")]
    Retrieve(#[source] TokenError),

    /// Every attempt failed.
    #[error("token refresh failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Total handler invocations made.
        attempts: u32,
        /// The last handler failure.
        last: String,
    },

    /// The overall refresh deadline passed.
    #[error("token refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The refresh was cancelled by its caller.
    #[error("token refresh cancelled")]
    Cancelled,

    /// The handler returned a token with an empty value.
    #[error("refresh handler returned an invalid token")]
    InvalidRefreshedToken,

    /// The refreshed token could not be persisted.
    #[error("failed to store refreshed token: {0}")]
    Store(#[source] TokenError),
}

impl RefreshError {
    /// Returns true if the refresh stopped because of a deadline or cancel.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RefreshError::TimedOut(_) | RefreshError::Cancelled)
    }
}
