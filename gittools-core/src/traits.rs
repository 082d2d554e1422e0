//! Trait definitions for gittools.
//!
//! These are the seams between the core and its collaborators: storage
//! backends, the refresh callback and progress sinks are all injected.

use async_trait::async_trait;

use crate::error::TokenError;
use crate::models::Token;

/// Key/value persistence for tokens.
///
/// Implementations must be safe to share across threads. Every method
/// reports failures with [`TokenError`] kinds:
///
/// - `store` rejects tokens that fail [`Token::is_valid`] with `Invalid`.
/// - `retrieve` checks existence, then validity, then expiry, returning
///   `NotFound`, `Invalid` or `Expired` respectively.
/// - `delete` of a missing key succeeds.
/// - `list` returns an empty vec when nothing is stored.
pub trait TokenStorage: Send + Sync {
    /// Stores a token under `key`, replacing any previous entry.
    fn store(&self, key: &str, token: &Token) -> Result<(), TokenError>;

    /// Retrieves the token stored under `key`.
    fn retrieve(&self, key: &str) -> Result<Token, TokenError>;

    /// Removes the token stored under `key`.
    fn delete(&self, key: &str) -> Result<(), TokenError>;

    /// Lists every key currently held.
    fn list(&self) -> Result<Vec<String>, TokenError>;

    /// Releases backend resources.
    fn close(&self) -> Result<(), TokenError>;
}

/// Produces a replacement for a token that is about to expire.
///
/// Supplied by the caller; the refresh manager bounds each call with a
/// timeout and drops the future when it fires.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Returns a brand-new token superseding `current`.
    async fn refresh_token(&self, current: &Token) -> Result<Token, TokenError>;
}

/// Receives progress of a long-running operation.
pub trait ProgressReporter: Send + Sync {
    /// An operation named `operation` started.
    fn start(&self, operation: &str);

    /// `current` of `total` units are done.
    fn update(&self, current: u64, total: u64);

    /// The operation finished successfully.
    fn complete(&self);

    /// The operation failed.
    fn error(&self, message: &str);
}

/// Progress sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _operation: &str) {}
    fn update(&self, _current: u64, _total: u64) {}
    fn complete(&self) {}
    fn error(&self, _message: &str) {}
}
