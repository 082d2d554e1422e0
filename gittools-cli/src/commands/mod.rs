//! CLI command implementations.

pub mod clone;
pub mod publish;
pub mod sync;
pub mod token;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gittools_core::{ProviderKind, Token, TokenError, TokenStorage};
use gittools_git::LineSink;
use gittools_providers::{GitHubClient, GitHubValidator};
use gittools_store::{EnvStorage, Settings, format_env_key};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Loads the token for `kind`: an explicit value wins over the stored one.
pub fn resolve_token(explicit: Option<&str>, kind: ProviderKind) -> Result<Token> {
    if let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Token::new(value, None, "").context("invalid token value");
    }

    let var = format_env_key(kind.as_str());
    EnvStorage::new().retrieve(kind.as_str()).map_err(|e| {
        let hint = match &e {
            TokenError::NotFound => format!("{} token not found. Set {var} or run `gittools token setup`", kind.display_name()),
            TokenError::Expired => format!("{} token has expired. Please provide a new token", kind.display_name()),
            TokenError::Invalid => format!("{} token is invalid. Check the token stored in {var}", kind.display_name()),
            _ => format!("failed to read {} token", kind.display_name()),
        };
        anyhow::Error::new(e).context(hint)
    })
}

/// Validates a GitHub token, including `admin:repo`, and builds a client.
pub async fn github_client(settings: &Settings, token: &mut Token) -> Result<GitHubClient> {
    let validator = GitHubValidator::with_base_url(&settings.github_api_url)?.with_admin_scope();
    GitHubClient::with_validator(&validator, token)
        .await
        .context("GitHub token validation failed")
}

/// Where formatted git output goes.
pub fn git_sink(quiet: bool) -> LineSink {
    if quiet {
        Arc::new(|_line: &str| {})
    } else {
        Arc::new(|line: &str| eprintln!("{line}"))
    }
}

/// Cancellation token fired by Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling...");
            trigger.cancel();
        }
    });
    cancel
}

/// Extracts `(owner, repo)` from an `https://host/owner/repo(.git)` URL.
pub fn parse_repo_url(raw: &str) -> Result<(String, String)> {
    if gittools_git::is_ssh_url(raw) {
        bail!(gittools_git::SSH_REJECTED);
    }
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid repository URL: {raw}"))?;
    if url.scheme() != "https" {
        bail!("repository URL must use https: {raw}");
    }

    let mut segments = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();
    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                bail!("URL must include owner and repository: {raw}");
            }
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => bail!("URL must include owner and repository: {raw}"),
    }
}
