//! Sync command - dispatch and follow the sync workflow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use clap::{Args, Subcommand};
use gittools_core::{parse_repo, ProviderKind, WorkflowRun};
use gittools_providers::{ApiError, GitHubClient};
use gittools_store::Settings;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{cancel_on_ctrl_c, github_client, resolve_token};
use crate::duration::parse_duration;
use crate::progress::WorkflowTracker;
use crate::{Cli, OutputFormat};

/// Name shown while following a run.
const TRACKER_NAME: &str = "Repository Sync";

/// Arguments for the sync command.
#[derive(Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub action: SyncAction,

    /// GitHub token (default: $GIT_TOKEN_GITHUB).
    #[arg(long, global = true)]
    pub token: Option<String>,
}

/// Sync subcommands.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Trigger the sync workflow.
    Run {
        /// Repository (owner/repo).
        #[arg(long)]
        repo: String,

        /// Wait for the run to finish.
        #[arg(long)]
        wait: bool,

        /// How long to wait (e.g. 30m).
        #[arg(long, default_value = "30m", value_parser = parse_duration)]
        timeout: Duration,

        /// Workflow file (default from settings).
        #[arg(long)]
        workflow: Option<String>,

        /// Git ref to run the workflow on.
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
    },

    /// Show the status of a run.
    Status {
        /// Repository (owner/repo).
        #[arg(long)]
        repo: String,

        /// Workflow run id.
        #[arg(long)]
        run_id: u64,

        /// Poll until the run completes.
        #[arg(long)]
        watch: bool,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Fetch the logs of a run.
    Logs {
        /// Repository (owner/repo).
        #[arg(long)]
        repo: String,

        /// Workflow run id.
        #[arg(long)]
        run_id: u64,

        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only the last N lines (0 for all).
        #[arg(long, default_value = "0")]
        tail: usize,

        /// Keep appending new output until the run completes.
        #[arg(long)]
        follow: bool,
    },

    /// Create or update the workflow file in a repository.
    PushWorkflow {
        /// Repository (owner/repo).
        #[arg(long)]
        repo: String,

        /// Local workflow file.
        #[arg(long)]
        file: PathBuf,

        /// Destination path in the repository.
        #[arg(long, default_value = ".github/workflows/sync.yml")]
        path: String,
    },
}

/// Runs the sync command.
pub async fn run(args: &SyncArgs, cli: &Cli, settings: &Settings) -> Result<()> {
    let repo = match &args.action {
        SyncAction::Run { repo, .. }
        | SyncAction::Status { repo, .. }
        | SyncAction::Logs { repo, .. }
        | SyncAction::PushWorkflow { repo, .. } => repo,
    };
    let (owner, name) = parse_repo(repo).context("invalid repository")?;

    let mut token = resolve_token(args.token.as_deref(), ProviderKind::GitHub)?;
    let client = github_client(settings, &mut token).await?;

    match &args.action {
        SyncAction::Run {
            wait,
            timeout,
            workflow,
            git_ref,
            ..
        } => {
            let workflow = workflow.as_deref().unwrap_or(&settings.sync_workflow);
            let request = RunRequest {
                owner: &owner,
                name: &name,
                workflow,
                git_ref,
                wait: *wait,
                timeout: *timeout,
            };
            run_sync(&client, &request, cli, settings).await
        }
        SyncAction::Status {
            run_id,
            watch,
            format,
            ..
        } => {
            let target = RunTarget { owner: &owner, name: &name, run_id: *run_id };
            if *watch {
                watch_status(&client, &target, *format, cli, settings).await
            } else {
                status(&client, &target, *format).await
            }
        }
        SyncAction::Logs {
            run_id,
            output,
            tail,
            follow,
            ..
        } => {
            let target = RunTarget { owner: &owner, name: &name, run_id: *run_id };
            let options = LogOptions {
                output: output.as_deref(),
                tail: *tail,
                follow: *follow,
                poll_interval: settings.poll_interval(),
            };
            logs(&client, &target, &options).await
        }
        SyncAction::PushWorkflow { file, path, .. } => {
            push_workflow(&client, &owner, &name, file, path, cli).await
        }
    }
}

struct RunRequest<'a> {
    owner: &'a str,
    name: &'a str,
    workflow: &'a str,
    git_ref: &'a str,
    wait: bool,
    timeout: Duration,
}

async fn run_sync(client: &GitHubClient, req: &RunRequest<'_>, cli: &Cli, settings: &Settings) -> Result<()> {
    client
        .trigger_workflow(req.owner, req.name, req.workflow, req.git_ref, &Map::new())
        .await
        .context("failed to trigger workflow")?;

    let runs = client
        .list_workflow_runs(req.owner, req.name, req.workflow)
        .await
        .context("failed to list workflow runs")?;
    let Some(latest) = runs.first() else {
        bail!("no workflow runs found");
    };
    println!("Triggered workflow run #{}", latest.id);

    if !req.wait {
        println!(
            "Run 'gittools sync status --repo {}/{} --run-id {}' to check status",
            req.owner, req.name, latest.id
        );
        return Ok(());
    }

    let cancel = cancel_on_ctrl_c();
    let mut tracker = WorkflowTracker::new(TRACKER_NAME, cli.quiet);
    let waited = tokio::time::timeout(
        req.timeout,
        client.wait_for_run(
            req.owner,
            req.name,
            latest.id,
            settings.poll_interval(),
            &cancel,
            |run| {
                tracker.observe(run);
            },
        ),
    )
    .await;

    let run = match waited {
        Ok(Ok(run)) => run,
        Ok(Err(ApiError::Cancelled)) => bail!("cancelled while waiting for workflow run #{}", latest.id),
        Ok(Err(e)) => return Err(anyhow::Error::new(e).context("failed to get workflow status")),
        Err(elapsed) => {
            return Err(anyhow::Error::new(elapsed).context("timeout waiting for workflow completion"));
        }
    };

    if !run.is_success() {
        bail!(
            "workflow failed with conclusion: {}",
            run.conclusion.as_deref().unwrap_or("unknown")
        );
    }
    info!(run_id = run.id, "Sync workflow succeeded");
    Ok(())
}

/// One workflow run in one repository.
struct RunTarget<'a> {
    owner: &'a str,
    name: &'a str,
    run_id: u64,
}

async fn status(client: &GitHubClient, target: &RunTarget<'_>, format: OutputFormat) -> Result<()> {
    let run = client
        .get_workflow_run(target.owner, target.name, target.run_id)
        .await
        .context("failed to get workflow run")?;
    print_run(&run, format)
}

async fn watch_status(
    client: &GitHubClient,
    target: &RunTarget<'_>,
    format: OutputFormat,
    cli: &Cli,
    settings: &Settings,
) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    // JSON output stays a single document, so progress lines are text only.
    let quiet = cli.quiet || format == OutputFormat::Json;
    let mut tracker = WorkflowTracker::new(TRACKER_NAME, quiet);

    let run = match client
        .wait_for_run(
            target.owner,
            target.name,
            target.run_id,
            settings.poll_interval(),
            &cancel,
            |run| {
                tracker.observe(run);
            },
        )
        .await
    {
        Ok(run) => run,
        Err(ApiError::Cancelled) => bail!("cancelled while watching workflow run #{}", target.run_id),
        Err(e) => return Err(anyhow::Error::new(e).context("failed to get workflow status")),
    };

    print_run(&run, format)?;
    if !run.is_success() {
        bail!(
            "workflow failed with conclusion: {}",
            run.conclusion.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn print_run(run: &WorkflowRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Workflow run #{}", run.id);
            println!("{}", "─".repeat(40));
            println!("Status:     {}", run.status);
            println!("Conclusion: {}", run.conclusion.as_deref().unwrap_or("-"));
            println!("Created:    {}", run.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Updated:    {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if !run.logs_url.is_empty() {
                println!("Logs:       {}", run.logs_url);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::to_string_pretty(&run_json(run))?;
            println!("{output}");
        }
    }
    Ok(())
}

/// Scripting view of a run.
fn run_json(run: &WorkflowRun) -> Value {
    json!({
        "id": run.id,
        "status": run.status.as_str(),
        "conclusion": run.conclusion.as_deref().unwrap_or(""),
        "created_at": run.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "updated_at": run.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

struct LogOptions<'a> {
    output: Option<&'a Path>,
    tail: usize,
    follow: bool,
    poll_interval: Duration,
}

/// Where log bytes are written.
enum LogSink {
    File(tokio::fs::File),
    Stdout(tokio::io::Stdout),
}

impl LogSink {
    async fn open(output: Option<&Path>) -> Result<Self> {
        match output {
            Some(path) => {
                let file = tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Ok(Self::File(file))
            }
            None => Ok(Self::Stdout(tokio::io::stdout())),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::File(file) => {
                file.write_all(bytes).await?;
                file.flush().await?;
            }
            Self::Stdout(out) => {
                out.write_all(bytes).await?;
                out.flush().await?;
            }
        }
        Ok(())
    }
}

async fn logs(client: &GitHubClient, target: &RunTarget<'_>, options: &LogOptions<'_>) -> Result<()> {
    let mut run = if options.follow {
        Some(
            client
                .get_workflow_run(target.owner, target.name, target.run_id)
                .await
                .context("failed to get workflow run")?,
        )
    } else {
        None
    };

    let bytes = fetch_logs(client, target).await?;
    let mut sink = LogSink::open(options.output).await?;
    let first = tail_lines(&bytes, options.tail);
    sink.write(&first).await?;
    let mut seen = bytes.len();
    let mut written = first.len();

    let cancel = if options.follow {
        cancel_on_ctrl_c()
    } else {
        CancellationToken::new()
    };
    while let Some(current) = run.as_ref().filter(|r| !r.is_completed()) {
        debug!(run_id = current.id, status = %current.status, "Following logs");
        tokio::select! {
            biased;
            () = cancel.cancelled() => bail!("cancelled while following logs of run #{}", target.run_id),
            () = tokio::time::sleep(options.poll_interval) => {}
        }

        run = Some(
            client
                .get_workflow_run(target.owner, target.name, target.run_id)
                .await
                .context("failed to get workflow run")?,
        );
        let bytes = fetch_logs(client, target).await?;
        let fresh = new_bytes(&bytes, seen);
        if !fresh.is_empty() {
            sink.write(fresh).await?;
            written += fresh.len();
        }
        seen = seen.max(bytes.len());
    }

    if let Some(path) = options.output {
        eprintln!("Wrote {written} bytes to {}", path.display());
    }
    Ok(())
}

async fn fetch_logs(client: &GitHubClient, target: &RunTarget<'_>) -> Result<Vec<u8>> {
    client
        .get_workflow_logs(target.owner, target.name, target.run_id)
        .await
        .context("failed to get workflow logs")
}

/// Bytes of `logs` past the first `seen`; empty if the logs did not grow.
fn new_bytes(logs: &[u8], seen: usize) -> &[u8] {
    logs.get(seen..).unwrap_or_default()
}

/// Keeps the last `n` lines of `bytes`; `0` keeps everything.
fn tail_lines(bytes: &[u8], n: usize) -> Vec<u8> {
    if n == 0 {
        return bytes.to_vec();
    }
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut tail = lines[start..].join("\n");
    tail.push('\n');
    tail.into_bytes()
}

async fn push_workflow(
    client: &GitHubClient,
    owner: &str,
    name: &str,
    file: &Path,
    path: &str,
    cli: &Cli,
) -> Result<()> {
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    client
        .create_or_update_workflow(owner, name, path, &content)
        .await
        .with_context(|| format!("failed to write {path} in {owner}/{name}"))?;

    if !cli.quiet {
        println!("Workflow {path} written to {owner}/{name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        let logs = b"one\ntwo\nthree\nfour\n";
        assert_eq!(tail_lines(logs, 0), logs.to_vec());
        assert_eq!(tail_lines(logs, 2), b"three\nfour\n".to_vec());
        assert_eq!(tail_lines(logs, 10), logs.to_vec());
    }

    #[test]
    fn test_new_bytes() {
        let logs = b"step 1\nstep 2\n";
        assert_eq!(new_bytes(logs, 0), logs);
        assert_eq!(new_bytes(logs, 7), b"step 2\n");
        assert!(new_bytes(logs, logs.len()).is_empty());
        // Logs that shrink between polls yield nothing.
        assert!(new_bytes(b"step 1\n", 14).is_empty());
    }

    #[test]
    fn test_run_json_shape() {
        let run: WorkflowRun = serde_json::from_str(
            r#"{
                "id": 42,
                "status": "in_progress",
                "conclusion": null,
                "created_at": "2024-01-02T03:04:05Z",
                "updated_at": "2024-01-02T03:09:05Z"
            }"#,
        )
        .unwrap();

        let value = run_json(&run);
        assert_eq!(value["id"], 42);
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["conclusion"], "");
        assert_eq!(value["created_at"], "2024-01-02T03:04:05Z");
        assert_eq!(value["updated_at"], "2024-01-02T03:09:05Z");
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_status_flags_parse() {
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "gittools", "sync", "status", "--repo", "o/r", "--run-id", "7", "--watch", "--format", "json",
        ])
        .unwrap();
        let crate::Commands::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        match args.action {
            SyncAction::Status { run_id, watch, format, .. } => {
                assert_eq!(run_id, 7);
                assert!(watch);
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected status action"),
        }

        let cli = Cli::try_parse_from([
            "gittools", "sync", "logs", "--repo", "o/r", "--run-id", "7", "--follow",
        ])
        .unwrap();
        let crate::Commands::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert!(matches!(args.action, SyncAction::Logs { follow: true, tail: 0, .. }));
    }
}
