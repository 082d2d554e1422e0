//! Hosting provider types.
//!
//! - [`ProviderKind`] - Enum of supported Git hosting providers
//! - [`detect_provider`] - Infer the provider from a raw token string

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ============================================================================
// Token Prefixes
// ============================================================================

/// Token prefixes and the provider that issues them.
///
/// Prefixes are disjoint, so the first match is the only match.
const TOKEN_PREFIXES: &[(&str, ProviderKind)] = &[
    ("ghp_", ProviderKind::GitHub),
    ("github_pat_", ProviderKind::GitHub),
    ("glpat-", ProviderKind::GitLab),
];

// ============================================================================
// Provider Kind
// ============================================================================

/// Supported Git hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    /// GitHub (github.com or GitHub Enterprise)
    GitHub,
    /// GitLab (gitlab.com or self-managed)
    GitLab,
}

impl ProviderKind {
    /// Returns the canonical name, also used as the default storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "GITHUB",
            Self::GitLab => "GITLAB",
        }
    }

    /// Returns the display name for this provider.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
        }
    }

    /// Returns all supported provider kinds.
    pub fn all() -> &'static [ProviderKind] {
        &[Self::GitHub, Self::GitLab]
    }

    /// Token prefixes recognised by [`detect`](Self::detect) for this provider.
    pub fn token_prefixes(&self) -> Vec<&'static str> {
        TOKEN_PREFIXES
            .iter()
            .filter(|(_, kind)| kind == self)
            .map(|(prefix, _)| *prefix)
            .collect()
    }

    /// Infers the provider from a token's literal prefix.
    ///
    /// Pure classification, case-sensitive. Returns `None` for anything
    /// that does not carry a known prefix, including the empty string.
    pub fn detect(raw_token: &str) -> Option<Self> {
        TOKEN_PREFIXES
            .iter()
            .find(|(prefix, _)| raw_token.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            _ => Err(CoreError::InvalidProvider(s.to_string())),
        }
    }
}

/// Infers the provider from a raw token string.
///
/// Free-function form of [`ProviderKind::detect`].
pub fn detect_provider(raw_token: &str) -> Option<ProviderKind> {
    ProviderKind::detect(raw_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_prefixes() {
        assert_eq!(detect_provider("ghp_x"), Some(ProviderKind::GitHub));
        assert_eq!(detect_provider("github_pat_x"), Some(ProviderKind::GitHub));
        assert_eq!(detect_provider("glpat-x"), Some(ProviderKind::GitLab));
    }

    #[test]
    fn test_token_prefixes_round_trip() {
        assert_eq!(ProviderKind::GitHub.token_prefixes(), vec!["ghp_", "github_pat_"]);
        assert_eq!(ProviderKind::GitLab.token_prefixes(), vec!["glpat-"]);
        for kind in ProviderKind::all() {
            for prefix in kind.token_prefixes() {
                assert_eq!(ProviderKind::detect(&format!("{prefix}x")), Some(*kind));
            }
        }
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(detect_provider("anything-else"), None);
        assert_eq!(detect_provider(""), None);
        assert_eq!(detect_provider("GHP_x"), None);
        assert_eq!(detect_provider("glpat_x"), None);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("GITHUB".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert_eq!("gitlab".parse::<ProviderKind>().unwrap(), ProviderKind::GitLab);
        assert!("bitbucket".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_display_is_storage_key() {
        assert_eq!(ProviderKind::GitHub.to_string(), "GITHUB");
        assert_eq!(ProviderKind::GitLab.to_string(), "GITLAB");
    }
}
