//! Token validation against a live provider.

use async_trait::async_trait;
use gittools_core::{ProviderKind, Token, TokenError};

use crate::error::ApiError;
use crate::github::GitHubValidator;
use crate::gitlab::GitLabValidator;

/// Validates a token with its provider and enriches it in place.
///
/// Implementations run three phases in order: local checks (non-empty,
/// not expired), a "who am I" call that overwrites `token.scope` (and
/// `token.expires_at` when the provider reports it), then the required
/// scope policy.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Provider this validator talks to.
    fn provider(&self) -> ProviderKind;

    /// Validates `token`, updating its scope and expiry.
    async fn validate(&self, token: &mut Token) -> Result<(), ApiError>;
}

/// Returns the default validator for a provider.
pub fn validator_for(kind: ProviderKind) -> Result<Box<dyn TokenValidator>, ApiError> {
    Ok(match kind {
        ProviderKind::GitHub => Box::new(GitHubValidator::new()?),
        ProviderKind::GitLab => Box::new(GitLabValidator::new()?),
    })
}

/// Returns a validator for a provider reached through `base_url`.
pub fn validator_with_base_url(
    kind: ProviderKind,
    base_url: &str,
) -> Result<Box<dyn TokenValidator>, ApiError> {
    Ok(match kind {
        ProviderKind::GitHub => Box::new(GitHubValidator::with_base_url(base_url)?),
        ProviderKind::GitLab => Box::new(GitLabValidator::with_base_url(base_url)?),
    })
}

/// Local phase shared by every validator.
pub(crate) fn precheck(token: &Token) -> Result<(), TokenError> {
    if !token.is_valid() {
        return Err(TokenError::Invalid);
    }
    if token.is_expired() {
        return Err(TokenError::Expired);
    }
    Ok(())
}
