//! Core error types for gittools.

use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Token Error
// ============================================================================

/// Error kinds of the token lifecycle.
///
/// Storage backends, validators and the refresh manager all report through
/// this type so callers can match on the kind instead of parsing messages.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token is stored under the requested key.
    #[error("token not found")]
    NotFound,

    /// The token is malformed (empty value).
    #[error("invalid token")]
    Invalid,

    /// The token is expired, or too close to expiry to be considered healthy.
    #[error("token expired")]
    Expired,

    /// The storage backend could not be used.
    #[error("token storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The provider reported an empty scope list.
    #[error("no scopes provided")]
    NoScopes,

    /// The token lacks one or more required scopes.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// A refresh handler could not produce a new token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// A stored token could not be encoded or decoded.
    #[error("token serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenError {
    /// Returns true if no token exists for the key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TokenError::NotFound)
    }

    /// Returns true if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}

// ============================================================================
// Scope Error
// ============================================================================

/// Structured scope validation failure.
///
/// Carries the missing scopes and a present/absent map over every required
/// scope so a caller can render a checklist without re-parsing anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required scopes: {}", .missing.join(", "))]
pub struct ScopeError {
    /// Required scopes the token does not carry, in required-set order.
    pub missing: Vec<String>,
    /// Every required scope mapped to whether the token carries it.
    pub status: BTreeMap<String, bool>,
}

impl ScopeError {
    /// Returns true if the given scope was required and is absent.
    pub fn is_missing(&self, scope: &str) -> bool {
        self.missing.iter().any(|s| s == scope)
    }
}

// ============================================================================
// Core Error
// ============================================================================

/// Error type for parsing core identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Repository string is not in `owner/repo` form.
    #[error("invalid repository format {0:?}, expected owner/repo")]
    InvalidRepository(String),

    /// Provider name is not recognised.
    #[error("unknown provider: {0}")]
    InvalidProvider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_error_display_lists_missing() {
        let err = ScopeError {
            missing: vec!["workflow".to_string(), "admin:repo".to_string()],
            status: BTreeMap::new(),
        };
        assert_eq!(
            err.to_string(),
            "missing required scopes: workflow, admin:repo"
        );
        assert!(err.is_missing("workflow"));
        assert!(!err.is_missing("repo"));
    }

    #[test]
    fn test_scope_error_is_transparent_in_token_error() {
        let err = TokenError::from(ScopeError {
            missing: vec!["api".to_string()],
            status: BTreeMap::from([("api".to_string(), false)]),
        });
        assert_eq!(err.to_string(), "missing required scopes: api");
    }

    #[test]
    fn test_no_scopes_is_distinct_from_missing_scopes() {
        let none = TokenError::NoScopes;
        assert_eq!(none.to_string(), "no scopes provided");
        assert!(!matches!(none, TokenError::Scope(_)));
    }
}
