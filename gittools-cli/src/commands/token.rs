//! Token command - set up, inspect and refresh stored tokens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use gittools_core::{ProviderKind, RefreshHandler, ScopeError, Token, TokenError, TokenStorage};
use gittools_providers::{ApiError, GitHubValidator, GitLabValidator, TokenValidator};
use gittools_store::{format_env_key, EnvStorage, Settings, TokenManager};
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use crate::duration::parse_duration;
use crate::Cli;

/// Provider override for non-interactive setup.
const ENV_PROVIDER: &str = "GIT_PROVIDER";
/// Token value for non-interactive setup.
const ENV_TOKEN_VALUE: &str = "GIT_TOKEN_VALUE";
/// Expiry (`30d`, `1y`, ...) for non-interactive setup.
const ENV_TOKEN_EXPIRY: &str = "GIT_TOKEN_EXPIRY";

/// How long an interactive prompt waits for input.
const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens closer than this to expiry get a warning after setup.
const EXPIRY_WARNING_DAYS: i64 = 7;

/// Arguments for the token command.
#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub action: TokenAction,
}

/// Token subcommands.
#[derive(Subcommand)]
pub enum TokenAction {
    /// Validate a token with its provider and store it.
    Setup(SetupArgs),

    /// Show a stored token, value redacted.
    Show {
        /// Provider whose token to show.
        #[arg(long, short, default_value = "github")]
        provider: ProviderKind,
    },

    /// List stored token keys.
    List,

    /// Remove a stored token.
    Delete {
        /// Storage key (e.g. GITHUB).
        key: String,
    },

    /// Check that a stored token has enough validity left.
    Check {
        /// Provider whose token to check.
        #[arg(long, short, default_value = "github")]
        provider: ProviderKind,
    },

    /// Replace a stored token with a newly issued one.
    Refresh {
        /// Provider whose token to replace.
        #[arg(long, short, default_value = "github")]
        provider: ProviderKind,

        /// Replacement token value (default: $GIT_TOKEN_VALUE).
        #[arg(long, short)]
        token: Option<String>,

        /// Print a shell `export` line for the refreshed token.
        #[arg(long)]
        export: bool,
    },
}

/// Arguments for `token setup`.
#[derive(Args, Default)]
pub struct SetupArgs {
    /// Token value.
    #[arg(long, short)]
    pub token: Option<String>,

    /// File containing the token value.
    #[arg(long, short = 'f')]
    pub token_file: Option<PathBuf>,

    /// Token expiration (e.g. 30d, 1y).
    #[arg(long, short)]
    pub expires: Option<String>,

    /// Never prompt; read missing values from GIT_TOKEN_VALUE / GIT_TOKEN_EXPIRY.
    #[arg(long, short)]
    pub non_interactive: bool,

    /// Print a shell `export` line for the stored token.
    #[arg(long)]
    pub export: bool,
}

/// Runs the token command.
pub async fn run(args: &TokenArgs, cli: &Cli, settings: &Settings) -> Result<()> {
    let storage = EnvStorage::new();
    match &args.action {
        TokenAction::Setup(setup_args) => setup(setup_args, cli, settings, &storage).await,
        TokenAction::Show { provider } => show(*provider, &storage),
        TokenAction::List => list(&storage),
        TokenAction::Delete { key } => delete(key, &storage),
        TokenAction::Check { provider } => check(*provider, settings),
        TokenAction::Refresh {
            provider,
            token,
            export,
        } => refresh(*provider, token.as_deref(), *export, settings).await,
    }
}

// ============================================================================
// Setup
// ============================================================================

async fn setup(args: &SetupArgs, cli: &Cli, settings: &Settings, storage: &EnvStorage) -> Result<()> {
    let mut value = args.token.clone();
    let mut expires = args.expires.clone();

    if args.non_interactive {
        value = value.or_else(|| env_value(ENV_TOKEN_VALUE));
        expires = expires.or_else(|| env_value(ENV_TOKEN_EXPIRY));
    }

    if let Some(path) = &args.token_file {
        if let Some(warning) = insecure_permissions(path)? {
            eprintln!("Warning: {warning}");
        }
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read token file {}", path.display()))?;
        value = Some(contents.trim().to_string());
    }

    let value = match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v.trim().to_string(),
        None if args.non_interactive => {
            bail!("no token provided: pass --token, --token-file or set {ENV_TOKEN_VALUE}")
        }
        None => prompt_token().await?,
    };

    let provider = match ProviderKind::detect(&value) {
        Some(kind) => kind,
        None => env_value(ENV_PROVIDER)
            .map(|p| p.parse::<ProviderKind>())
            .transpose()?
            .context("unable to detect token provider. Please ensure you're using a valid GitHub or GitLab token")?,
    };
    if !cli.quiet {
        eprintln!("Detected {} token", provider.display_name());
    }

    let expires_at = expires
        .as_deref()
        .map(|raw| expiry_after(raw, Utc::now()))
        .transpose()?;

    let mut token = Token::new(value, expires_at, "")?;
    let validator = validator(provider, settings)?;
    if let Err(e) = validator.validate(&mut token).await {
        if let ApiError::Token(TokenError::Scope(scope)) = &e {
            print_scope_status(provider, scope);
        }
        return Err(anyhow::Error::new(e)
            .context(format!("{} token validation failed", provider.display_name())));
    }

    storage.store(provider.as_str(), &token)?;
    info!(provider = %provider, "Token stored");

    let var = format_env_key(provider.as_str());
    if args.export {
        println!("{}", export_line(&var, &token)?);
        return Ok(());
    }

    if !cli.quiet {
        println!();
        println!("Successfully configured {} token!", provider.display_name());
        println!();
        print_details(provider, &token);
        println!();
        println!("Environment variable set: {var}");
        println!("(rerun with --export and eval the output to keep it in your shell)");
    }
    Ok(())
}

/// Absolute expiry `raw` (e.g. `30d`) after `now`.
fn expiry_after(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let duration = parse_duration(raw).map_err(anyhow::Error::msg)?;
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .with_context(|| format!("token expiration '{raw}' is too far in the future"))
}

fn validator(provider: ProviderKind, settings: &Settings) -> Result<Box<dyn TokenValidator>> {
    Ok(match provider {
        ProviderKind::GitHub => {
            Box::new(GitHubValidator::with_base_url(&settings.github_api_url)?.with_admin_scope())
        }
        ProviderKind::GitLab => Box::new(GitLabValidator::with_base_url(&settings.gitlab_api_url)?),
    })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

async fn prompt_token() -> Result<String> {
    eprint!("\nPlease enter your Git token: ");

    let mut line = String::new();
    let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::time::timeout(PROMPT_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("no token provided within 30 seconds")??;

    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("no token provided");
    }
    Ok(value)
}

/// Returns a warning when `path` is readable or writable by group or others.
#[cfg(unix)]
fn insecure_permissions(path: &Path) -> Result<Option<String>> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .with_context(|| format!("failed to check permissions of {}", path.display()))?
        .permissions()
        .mode();
    if mode & 0o077 != 0 {
        return Ok(Some(format!(
            "token file has insecure permissions. Please run: chmod 600 {}",
            path.display()
        )));
    }
    Ok(None)
}

#[cfg(not(unix))]
fn insecure_permissions(_path: &Path) -> Result<Option<String>> {
    Ok(None)
}

fn print_scope_status(provider: ProviderKind, scope: &ScopeError) {
    println!();
    println!("Required {} token scopes:", provider.display_name());
    for (name, present) in &scope.status {
        println!("{} {name}", if *present { "✓" } else { "✗" });
    }
    println!();
    println!("Token is missing required scopes. Please add the scopes marked with ✗");
}

fn print_details(provider: ProviderKind, token: &Token) {
    println!("Token details:");
    println!("Provider: {}", provider.display_name());
    println!("Scopes: {}", if token.scope.is_empty() { "(none)" } else { &token.scope });
    match token.expires_at {
        Some(at) => {
            println!("Expires: {}", at.format("%B %-d, %Y at %-I:%M %p UTC"));
            let days = (at - Utc::now()).num_days();
            if days < EXPIRY_WARNING_DAYS {
                println!();
                println!("Warning: Token will expire in {days} days");
            }
        }
        None => println!("Expires: Never"),
    }
}

/// `export NAME='<json>'`, quoted for POSIX shells.
fn export_line(var: &str, token: &Token) -> Result<String> {
    let body = serde_json::to_string(token)?;
    Ok(format!("export {var}='{}'", body.replace('\'', r"'\''")))
}

// ============================================================================
// Inspection
// ============================================================================

fn show(provider: ProviderKind, storage: &EnvStorage) -> Result<()> {
    let token = storage
        .retrieve(provider.as_str())
        .with_context(|| format!("no usable {} token stored", provider.display_name()))?;
    println!("{}", serde_json::to_string_pretty(&token.redacted())?);
    Ok(())
}

fn list(storage: &EnvStorage) -> Result<()> {
    let keys = storage.list()?;
    if keys.is_empty() {
        println!("No tokens stored");
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

fn delete(key: &str, storage: &EnvStorage) -> Result<()> {
    storage.delete(key)?;
    println!("unset {}", format_env_key(key));
    Ok(())
}

// ============================================================================
// Health & refresh
// ============================================================================

/// Refresh source that validates a caller-supplied replacement token.
struct ReplacementHandler {
    replacement: String,
    validator: Box<dyn TokenValidator>,
}

#[async_trait]
impl RefreshHandler for ReplacementHandler {
    async fn refresh_token(&self, current: &Token) -> Result<Token, TokenError> {
        let mut token = Token::new(self.replacement.clone(), None, current.scope.clone())?;
        self.validator
            .validate(&mut token)
            .await
            .map_err(|e| match e {
                ApiError::Token(inner) => inner,
                other => TokenError::RefreshFailed(other.to_string()),
            })?;
        Ok(token)
    }
}

/// Handler for managers that only run health checks.
struct NoRefresh;

#[async_trait]
impl RefreshHandler for NoRefresh {
    async fn refresh_token(&self, _current: &Token) -> Result<Token, TokenError> {
        Err(TokenError::RefreshFailed(
            "no replacement token supplied".to_string(),
        ))
    }
}

fn check(provider: ProviderKind, settings: &Settings) -> Result<()> {
    let manager = TokenManager::new(
        Arc::new(EnvStorage::new()),
        Arc::new(NoRefresh),
        settings.refresh.to_refresh_config(),
    );
    let key = provider.as_str();

    match manager.check_health(key) {
        Ok(()) => {
            println!("{} token is healthy", provider.display_name());
            Ok(())
        }
        Err(TokenError::Expired) => {
            warn!(key = %key, "Token inside refresh window");
            Err(anyhow::Error::new(TokenError::Expired).context(format!(
                "{} token expires within {}h; run `gittools token refresh`",
                provider.display_name(),
                settings.refresh.min_valid_time_secs / 3600
            )))
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("{} token check failed", provider.display_name()))),
    }
}

async fn refresh(
    provider: ProviderKind,
    replacement: Option<&str>,
    export: bool,
    settings: &Settings,
) -> Result<()> {
    let replacement = replacement
        .map(str::to_string)
        .or_else(|| env_value(ENV_TOKEN_VALUE))
        .context("no replacement token: pass --token or set GIT_TOKEN_VALUE")?;

    let storage = Arc::new(EnvStorage::new());
    let config = settings
        .refresh
        .to_refresh_config()
        .with_progress(|message| info!(message = %message, "Refresh progress"));
    let manager = TokenManager::new(
        storage.clone(),
        Arc::new(ReplacementHandler {
            replacement,
            validator: validator(provider, settings)?,
        }),
        config,
    );

    manager
        .refresh_token(provider.as_str())
        .await
        .with_context(|| format!("failed to refresh {} token", provider.display_name()))?;

    let token = storage.retrieve(provider.as_str())?;
    if export {
        println!("{}", export_line(&format_env_key(provider.as_str()), &token)?);
    } else {
        println!("{} token refreshed", provider.display_name());
        print_details(provider, &token);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_line_quotes_json() {
        let token = Token::new("ghp_abc", None, "repo workflow").unwrap();
        let line = export_line("GIT_TOKEN_GITHUB", &token).unwrap();
        assert!(line.starts_with("export GIT_TOKEN_GITHUB='{"));
        assert!(line.ends_with("}'"));
        assert!(line.contains(r#""Value":"ghp_abc""#));
    }

    #[test]
    fn test_expiry_after() {
        let now = Utc::now();
        assert_eq!(expiry_after("30d", now).unwrap(), now + chrono::Duration::days(30));
        assert!(expiry_after("soon", now).is_err());

        // Past the calendar range, or past what a signed delta can hold.
        let err = expiry_after("1000000y", now).unwrap_err();
        assert!(err.to_string().contains("too far in the future"), "{err}");
        assert!(expiry_after("100000000000y", now).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ghp_abc\n").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(insecure_permissions(&path).unwrap().is_none());

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let warning = insecure_permissions(&path).unwrap().unwrap();
        assert!(warning.contains("chmod 600"));
    }

    #[tokio::test]
    async fn test_no_refresh_handler_fails() {
        let token = Token::new("ghp_abc", None, "").unwrap();
        assert!(matches!(
            NoRefresh.refresh_token(&token).await,
            Err(TokenError::RefreshFailed(_))
        ));
    }
}
