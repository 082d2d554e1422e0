//! Publish command - push a private repository to its public counterpart.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use gittools_core::ProviderKind;
use gittools_git::{clone_repository, CloneOptions};
use gittools_providers::PullRequestOptions;
use gittools_store::Settings;
use tracing::info;

use super::{cancel_on_ctrl_c, git_sink, github_client, parse_repo_url, resolve_token};
use crate::progress::ConsoleProgress;
use crate::Cli;

/// Arguments for the publish command.
#[derive(Args)]
pub struct PublishArgs {
    /// Private repository URL.
    #[arg(long)]
    pub private: String,

    /// Public repository URL.
    #[arg(long)]
    pub public: String,

    /// Branch to publish.
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Fork the private repository's upstream before publishing.
    #[arg(long)]
    pub create_fork: bool,

    /// Open a pull request after publishing.
    #[arg(long)]
    pub pr: bool,

    /// Pull request title.
    #[arg(long)]
    pub pr_title: Option<String>,

    /// Pull request description.
    #[arg(long, default_value = "")]
    pub pr_desc: String,

    /// Branch the pull request targets.
    #[arg(long, default_value = "main")]
    pub target_branch: String,

    /// GitHub token (default: $GIT_TOKEN_GITHUB).
    #[arg(long)]
    pub token: Option<String>,
}

/// Runs the publish command.
pub async fn run(args: &PublishArgs, cli: &Cli, settings: &Settings) -> Result<()> {
    let (private_owner, private_repo) =
        parse_repo_url(&args.private).context("failed to parse private repository URL")?;
    let (public_owner, _) =
        parse_repo_url(&args.public).context("failed to parse public repository URL")?;
    if args.pr && args.pr_title.as_deref().is_none_or(str::is_empty) {
        bail!("--pr-title is required when creating a pull request");
    }

    let mut token = resolve_token(args.token.as_deref(), ProviderKind::GitHub)?;
    let client = github_client(settings, &mut token).await?;

    if args.create_fork {
        let full_name = format!("{private_owner}/{private_repo}");
        if !cli.quiet {
            println!("Creating fork of {full_name}...");
        }
        client
            .create_fork(&full_name)
            .await
            .context("failed to create fork")?;
    }

    let options = CloneOptions::new(args.private.clone())
        .with_target(args.public.clone())
        .with_token(token.value.clone())
        .with_progress(Arc::new(ConsoleProgress::new(cli.quiet)))
        .with_sink(git_sink(cli.quiet))
        .with_cancel(cancel_on_ctrl_c());
    clone_repository(&options)
        .await
        .context("failed to push to public repository")?;

    info!(private = %args.private, public = %args.public, "Published");
    if !cli.quiet {
        println!("Successfully published {} to {}", args.private, args.public);
    }

    if args.pr {
        let pr = PullRequestOptions {
            owner: private_owner.clone(),
            repo: private_repo.clone(),
            title: args.pr_title.clone().unwrap_or_default(),
            body: args.pr_desc.clone(),
            head: format!("{public_owner}:{}", args.branch),
            base: args.target_branch.clone(),
        };
        if !cli.quiet {
            println!("Creating pull request from {} to {private_owner}/{private_repo}...", pr.head);
        }
        let created = client
            .create_pull_request(&pr)
            .await
            .context("failed to create pull request")?;
        println!("Created pull request #{}: {}", created.number, created.html_url);
    }

    Ok(())
}
