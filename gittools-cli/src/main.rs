// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! gittools CLI - token setup, repository mirroring and workflow sync.
//!
//! # Examples
//!
//! ```bash
//! # Validate and store a token
//! gittools token setup --token ghp_xxx --expires 90d
//!
//! # Mirror a public repository into a new private one
//! gittools clone --source https://github.com/owner/repo.git --private-name repo
//!
//! # Publish a private repository to a public fork and open a PR
//! gittools publish --private https://github.com/me/private-repo.git \
//!     --public https://github.com/me/repo.git --pr --pr-title "Sync"
//!
//! # Dispatch the sync workflow and wait for it
//! gittools sync run --repo owner/repo --wait --timeout 30m
//! ```

mod commands;
mod duration;
mod progress;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use gittools_core::TokenError;
use gittools_git::GitError;
use gittools_providers::ApiError;
use gittools_store::{RefreshError, Settings};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{clone, publish, sync, token};

// ============================================================================
// CLI Definition
// ============================================================================

/// gittools CLI - Git hosting workflow tools.
#[derive(Parser)]
#[command(name = "gittools")]
#[command(about = "Token lifecycle, repository mirroring and workflow sync for Git hosts")]
#[command(long_about = r#"
gittools manages Git hosting tokens and automates repository workflows.

Supported providers:
  • GitHub (ghp_, github_pat_ tokens)
  • GitLab (glpat- tokens)

Tokens are read from GIT_TOKEN_<PROVIDER> environment variables
(JSON, as printed by `gittools token setup --export`).

Examples:
  gittools token setup --token-file ~/.github-token
  gittools clone --source https://github.com/o/r.git --dir ./r
  gittools sync run --repo owner/repo --wait
"#)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Settings file (default: <config dir>/gittools/config.json).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Set up and inspect stored tokens.
    Token(token::TokenArgs),

    /// Clone a repository, or mirror it into another one.
    Clone(clone::CloneArgs),

    /// Mirror a private repository to a public one, optionally opening a PR.
    Publish(publish::PublishArgs),

    /// Drive the sync workflow.
    Sync(sync::SyncArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Target repository already exists.
    AlreadyExists = 2,
    /// Token rejected or missing scopes.
    InvalidToken = 3,
    /// Timeout.
    Timeout = 4,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                if api.is_already_exists() {
                    return Self::AlreadyExists;
                }
                if api.is_auth_failure() {
                    return Self::InvalidToken;
                }
            }
            if let Some(token) = cause.downcast_ref::<TokenError>() {
                if matches!(
                    token,
                    TokenError::Invalid | TokenError::Expired | TokenError::NoScopes | TokenError::Scope(_)
                ) {
                    return Self::InvalidToken;
                }
            }
            if let Some(GitError::Timeout { .. }) = cause.downcast_ref::<GitError>() {
                return Self::Timeout;
            }
            if let Some(RefreshError::TimedOut(_)) = cause.downcast_ref::<RefreshError>() {
                return Self::Timeout;
            }
            if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                return Self::Timeout;
            }
        }
        Self::Error
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let default = if verbose { "gittools=debug,info" } else { "gittools=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    use anyhow::Context;

    match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Settings::load().context("failed to load settings"),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match load_settings(&cli) {
        Ok(settings) => match &cli.command {
            Commands::Token(args) => token::run(args, &cli, &settings).await,
            Commands::Clone(args) => clone::run(args, &cli, &settings).await,
            Commands::Publish(args) => publish::run(args, &cli, &settings).await,
            Commands::Sync(args) => sync::run(args, &cli, &settings).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }
}
