//! Clone command - direct clones and private mirrors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use gittools_core::ProviderKind;
use gittools_git::{clone_repository, CloneOptions, DEFAULT_CLONE_TIMEOUT};
use gittools_providers::CreateRepoOptions;
use gittools_store::Settings;
use tracing::{debug, info};

use super::{cancel_on_ctrl_c, git_sink, github_client, parse_repo_url, resolve_token};
use crate::duration::parse_duration;
use crate::progress::ConsoleProgress;
use crate::Cli;

/// Prefix of repositories created by `--private-name`.
const PRIVATE_PREFIX: &str = "private-";

/// Arguments for the clone command.
#[derive(Args)]
#[command(group(
    ArgGroup::new("destination")
        .required(true)
        .args(["dir", "target", "private_name"]),
))]
pub struct CloneArgs {
    /// Repository to clone (https or file URL).
    #[arg(long, short)]
    pub source: String,

    /// Clone into this directory.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,

    /// Mirror all branches into this repository.
    #[arg(long)]
    pub target: Option<String>,

    /// Create `private-<NAME>` on GitHub and mirror into it.
    #[arg(long, value_name = "NAME")]
    pub private_name: Option<String>,

    /// Drop .github/workflows from the mirror.
    #[arg(long)]
    pub strip_workflows: bool,

    /// GitHub token (default: $GIT_TOKEN_GITHUB).
    #[arg(long)]
    pub token: Option<String>,

    /// Overall time limit (e.g. 10m).
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

/// Runs the clone command.
pub async fn run(args: &CloneArgs, cli: &Cli, settings: &Settings) -> Result<()> {
    let cancel = cancel_on_ctrl_c();

    let mut token = match (&args.private_name, resolve_token(args.token.as_deref(), ProviderKind::GitHub)) {
        (Some(_), result) => Some(result?),
        (None, Ok(token)) => Some(token),
        (None, Err(e)) => {
            debug!(error = %e, "Cloning without credentials");
            None
        }
    };

    let target = match (&args.private_name, &args.target) {
        (Some(name), _) => {
            let token = token.as_mut().context("a GitHub token is required for --private-name")?;
            Some(create_private_repo(settings, token, name, &args.source).await?)
        }
        (None, target) => target.clone(),
    };

    let mut options = CloneOptions::new(args.source.clone())
        .with_progress(Arc::new(ConsoleProgress::new(cli.quiet)))
        .with_sink(git_sink(cli.quiet))
        .with_cancel(cancel)
        .with_timeout(args.timeout.unwrap_or(DEFAULT_CLONE_TIMEOUT))
        .with_strip_workflows(args.strip_workflows);
    if let Some(dir) = &args.dir {
        options = options.with_working_dir(dir);
    }
    if let Some(target) = &target {
        options = options.with_target(target.clone());
    }
    if let Some(token) = &token {
        options = options.with_token(token.value.clone());
    }

    clone_repository(&options).await.context("clone operation failed")?;

    if !cli.quiet {
        match (&args.dir, &target) {
            (Some(dir), _) => println!("Cloned {} into {}", args.source, dir.display()),
            (None, Some(target)) => println!("Mirrored {} to {target}", args.source),
            (None, None) => {}
        }
    }
    Ok(())
}

async fn create_private_repo(
    settings: &Settings,
    token: &mut gittools_core::Token,
    name: &str,
    source: &str,
) -> Result<String> {
    let client = github_client(settings, token).await?;
    let name = format!("{PRIVATE_PREFIX}{name}");
    let description = match parse_repo_url(source) {
        Ok((owner, repo)) => format!("Private mirror of {owner}/{repo}"),
        Err(_) => "Private mirror".to_string(),
    };

    let repo = client
        .create_repository(&CreateRepoOptions {
            name: name.clone(),
            description,
            private: true,
            auto_init: false,
        })
        .await
        .with_context(|| format!("failed to create repository {name}"))?;

    info!(full_name = %repo.full_name, "Private repository ready");
    Ok(repo.clone_url)
}
