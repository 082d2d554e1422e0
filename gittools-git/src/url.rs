//! Remote URL validation and credential injection.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::GitError;

/// scp-style `user@host:path`.
static SCP_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~-]+@[A-Za-z0-9.-]+:").expect("Invalid regex"));

/// Message returned for any SSH-style remote.
pub const SSH_REJECTED: &str = "SSH URLs are not supported, please use HTTPS";

/// Returns true for `git@...`, `ssh://...` and `user@host:path` remotes.
pub fn is_ssh_url(raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with("git@")
        || raw.starts_with("ssh://")
        || raw.starts_with("git+ssh://")
        || (!raw.contains("://") && SCP_LIKE_RE.is_match(raw))
}

/// Validates a remote URL: SSH forms are rejected, then only `https` and
/// `file` schemes are accepted.
pub fn validate_url(raw: &str) -> Result<Url, GitError> {
    if is_ssh_url(raw) {
        return Err(GitError::Config(SSH_REJECTED.to_string()));
    }

    let parsed = Url::parse(raw.trim())
        .map_err(|e| GitError::InvalidUrl(format!("{}: {e}", redact_url(raw))))?;

    match parsed.scheme() {
        "https" => {
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(GitError::InvalidUrl(format!("{}: missing host", redact_url(raw))));
            }
            Ok(parsed)
        }
        "file" => Ok(parsed),
        other => Err(GitError::Config(format!(
            "unsupported URL scheme '{other}': only https and file URLs are accepted"
        ))),
    }
}

/// Embeds `token` as the userinfo of an `https` URL.
///
/// Non-https URLs and empty tokens pass through unchanged. Any existing
/// credentials are replaced.
pub fn inject_token(raw: &str, token: &str) -> Result<String, GitError> {
    if token.is_empty() || !raw.trim_start().starts_with("https://") {
        return Ok(raw.to_string());
    }

    let mut parsed = Url::parse(raw.trim())
        .map_err(|e| GitError::InvalidUrl(format!("{}: {e}", redact_url(raw))))?;
    parsed
        .set_password(None)
        .and_then(|()| parsed.set_username(token))
        .map_err(|()| GitError::InvalidUrl(format!("cannot set credentials on {}", redact_url(raw))))?;

    Ok(parsed.into())
}

/// Strips userinfo from a URL for logging.
pub fn redact_url(raw: &str) -> String {
    if let Ok(mut parsed) = Url::parse(raw.trim()) {
        if parsed.username().is_empty() && parsed.password().is_none() {
            return parsed.into();
        }
        if parsed.set_username("").is_ok() && parsed.set_password(None).is_ok() {
            return parsed.into();
        }
    }

    // Unparseable: drop anything between "://" and the last '@' of the authority.
    match raw.split_once("://") {
        Some((scheme, rest)) => {
            let authority_end = rest.find('/').unwrap_or(rest.len());
            match rest[..authority_end].rfind('@') {
                Some(at) => format!("{scheme}://{}", &rest[at + 1..]),
                None => raw.to_string(),
            }
        }
        None => raw.to_string(),
    }
}
