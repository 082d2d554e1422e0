//! Repository cloning and mirroring.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gittools_core::{NoopProgress, ProgressReporter, REDACTED};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::GitError;
use crate::process::{GitRunner, LineSink};
use crate::retry::RetryPolicy;
use crate::url::{redact_url, validate_url};

/// Budget for a whole clone or mirror operation.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Operation name reported to progress sinks.
pub const CLONE_OPERATION: &str = "Clone Repository";

const TEMP_PREFIX: &str = "gitclone-";
const WORKFLOWS_DIR: &str = ".github/workflows";
const COMMIT_NAME: &str = "gittools";
const COMMIT_EMAIL: &str = "gittools@users.noreply.github.com";
const STRIP_MESSAGE: &str = "Remove workflow files";

// ============================================================================
// Options
// ============================================================================

/// Inputs for [`clone_repository`].
///
/// With `working_dir` set the source is cloned there directly. Otherwise it
/// is cloned into a scratch directory and pushed, all branches, to
/// `target_url`.
#[derive(Clone)]
pub struct CloneOptions {
    /// Repository to clone.
    pub source_url: String,
    /// Mirror destination.
    pub target_url: Option<String>,
    /// Direct clone destination.
    pub working_dir: Option<PathBuf>,
    /// Credential embedded in https URLs for clone and push.
    pub token: Option<String>,
    /// Progress sink.
    pub progress: Option<Arc<dyn ProgressReporter>>,
    /// Cancellation scope.
    pub cancel: Option<CancellationToken>,
    /// Budget for the whole operation.
    pub timeout: Duration,
    /// Remove `.github/workflows` before pushing a mirror.
    pub strip_workflows: bool,
    /// Retry policy for clone and push.
    pub retry: RetryPolicy,
    /// Destination for formatted git output; stderr when unset.
    pub sink: Option<LineSink>,
    /// Parent directory for the scratch clone; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
}

impl fmt::Debug for CloneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneOptions")
            .field("source_url", &redact_url(&self.source_url))
            .field("target_url", &self.target_url.as_deref().map(redact_url))
            .field("working_dir", &self.working_dir)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("timeout", &self.timeout)
            .field("strip_workflows", &self.strip_workflows)
            .field("retry", &self.retry)
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl CloneOptions {
    /// Options for cloning `source_url`.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: None,
            working_dir: None,
            token: None,
            progress: None,
            cancel: None,
            timeout: DEFAULT_CLONE_TIMEOUT,
            strip_workflows: false,
            retry: RetryPolicy::default(),
            sink: None,
            temp_root: None,
        }
    }

    /// Mirrors into `url`.
    #[must_use]
    pub fn with_target(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Clones directly into `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the cancellation scope.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sets the overall budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Removes workflows from the mirror.
    #[must_use]
    pub fn with_strip_workflows(mut self, strip: bool) -> Self {
        self.strip_workflows = strip;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends formatted git output to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: LineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Creates the scratch clone under `root`.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

// ============================================================================
// Clone
// ============================================================================

/// Clones or mirrors a repository.
///
/// Reports `start`, `update` and then `complete` or `error` to the progress
/// sink.
#[instrument(skip(options), fields(source = %redact_url(&options.source_url)))]
pub async fn clone_repository(options: &CloneOptions) -> Result<(), GitError> {
    if options.source_url.trim().is_empty() {
        return Err(GitError::Config("source URL must be specified".to_string()));
    }

    let progress = options
        .progress
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgress));
    progress.start(CLONE_OPERATION);

    let result = run_clone(options, Arc::clone(&progress)).await;
    match &result {
        Ok(()) => {
            info!("Clone finished");
            progress.complete();
        }
        Err(e) => {
            warn!(error = %e, "Clone failed");
            progress.error(&e.to_string());
        }
    }
    result
}

/// Where the clone ends up.
enum Destination<'a> {
    Direct(&'a Path),
    Mirror(&'a str),
}

async fn run_clone(
    options: &CloneOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<(), GitError> {
    let cancel = options.cancel.clone().unwrap_or_default();
    if cancel.is_cancelled() {
        return Err(GitError::Cancelled);
    }

    validate_url(&options.source_url)?;

    let destination = match (&options.working_dir, &options.target_url) {
        (Some(dir), _) => Destination::Direct(dir),
        (None, Some(target)) if !target.trim().is_empty() => {
            validate_url(target)?;
            Destination::Mirror(target)
        }
        (None, _) => {
            return Err(GitError::Config(
                "either working directory or target URL must be specified".to_string(),
            ));
        }
    };

    let mut runner = GitRunner::new()?
        .with_token(options.token.clone())
        .with_progress(progress);
    if let Some(sink) = &options.sink {
        runner = runner.with_sink(Arc::clone(sink));
    }

    let work = async {
        match destination {
            Destination::Direct(dir) => clone_direct(&runner, options, dir, &cancel).await,
            Destination::Mirror(target) => clone_mirror(&runner, options, target, &cancel).await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GitError::Cancelled),
        result = tokio::time::timeout(options.timeout, work) => result.unwrap_or_else(|_| {
            Err(GitError::Timeout {
                op: "clone".to_string(),
                timeout: options.timeout,
            })
        }),
    }
}

async fn clone_direct(
    runner: &GitRunner,
    options: &CloneOptions,
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    let dir_arg = dir
        .to_str()
        .ok_or_else(|| GitError::Config(format!("working directory is not valid UTF-8: {}", dir.display())))?;
    let cwd = std::env::current_dir()?;

    debug!(dir = %dir.display(), "Cloning directly");
    runner
        .run_with_retry(
            &cwd,
            &["clone", options.source_url.trim(), dir_arg],
            &options.retry,
            cancel,
        )
        .await?;
    Ok(())
}

async fn clone_mirror(
    runner: &GitRunner,
    options: &CloneOptions,
    target: &str,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    let scratch = scratch_dir(options.temp_root.as_deref())?;
    let dir = scratch.path();
    let target = target.trim();
    debug!(scratch = %dir.display(), target = %redact_url(target), "Mirroring");

    runner
        .run_with_retry(
            dir,
            &["clone", options.source_url.trim(), "."],
            &options.retry,
            cancel,
        )
        .await?;

    if options.strip_workflows {
        strip_workflows(runner, dir, cancel).await?;
    }

    runner
        .run(dir, &["remote", "add", "target", target], cancel)
        .await?;
    runner
        .run_with_retry(dir, &["push", target, "--all"], &options.retry, cancel)
        .await?;

    Ok(())
}

fn scratch_dir(root: Option<&Path>) -> Result<TempDir, GitError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    let dir = match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

async fn strip_workflows(
    runner: &GitRunner,
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    debug!("Removing workflow files");
    runner
        .run(dir, &["rm", "-r", "-q", "--ignore-unmatch", WORKFLOWS_DIR], cancel)
        .await?;

    let leftover = dir.join(WORKFLOWS_DIR);
    if tokio::fs::try_exists(&leftover).await? {
        tokio::fs::remove_dir_all(&leftover).await?;
    }

    runner
        .run(dir, &["config", "user.name", COMMIT_NAME], cancel)
        .await?;
    runner
        .run(dir, &["config", "user.email", COMMIT_EMAIL], cancel)
        .await?;
    runner
        .run(dir, &["config", "commit.gpgsign", "false"], cancel)
        .await?;
    runner
        .run(dir, &["commit", "-q", "--allow-empty", "-m", STRIP_MESSAGE], cancel)
        .await?;
    Ok(())
}
