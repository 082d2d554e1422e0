//! Required-scope policy.

use std::collections::{BTreeMap, BTreeSet};

use gittools_core::{ScopeError, TokenError};

/// Scopes every GitHub token needs for Actions work.
pub const GITHUB_REQUIRED_SCOPES: &[&str] = &["repo", "workflow"];

/// Extra scope required when the caller manages repositories.
pub const GITHUB_ADMIN_SCOPE: &str = "admin:repo";

/// Scopes every GitLab token needs.
pub const GITLAB_REQUIRED_SCOPES: &[&str] = &["api"];

/// Splits a scope string on commas or whitespace.
pub fn parse_scopes(scope: &str) -> BTreeSet<&str> {
    scope
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Checks `scope` against `required`.
///
/// An empty scope string is [`TokenError::NoScopes`], distinct from a
/// non-empty string that lacks some required scope.
pub fn check_scopes(scope: &str, required: &[&str]) -> Result<(), TokenError> {
    let present = parse_scopes(scope);
    if present.is_empty() {
        return Err(TokenError::NoScopes);
    }

    let status: BTreeMap<String, bool> = required
        .iter()
        .map(|r| ((*r).to_string(), present.contains(r)))
        .collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|r| !present.contains(*r))
        .map(|r| (*r).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScopeError { missing, status }.into())
    }
}
