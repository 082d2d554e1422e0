//! Git subprocess execution.
//!
//! Every invocation runs non-interactively: credential prompts are disabled
//! through the environment, stdin is closed, and each command carries its
//! own timeout.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gittools_core::{ProgressReporter, REDACTED};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::GitError;
use crate::progress::{split_segments, ProgressFormatter};
use crate::retry::{self, RetryPolicy};
use crate::url::{inject_token, redact_url};

/// Per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Output kept per stream for error messages.
const MAX_CAPTURE: usize = 16 * 1024;

/// Lines of output quoted in a failure message.
const FAILURE_TAIL_LINES: usize = 6;

/// Environment that keeps git from prompting.
const NON_INTERACTIVE_ENV: &[(&str, &str)] = &[
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_ASKPASS", ""),
    ("GCM_INTERACTIVE", "never"),
];

/// Receives formatted output lines.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Output
// ============================================================================

/// How a command's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Format each segment and hand it to the sink as it arrives.
    Stream,
    /// Capture silently; surface only on failure.
    Discard,
}

impl OutputMode {
    /// Mode used for a git subcommand.
    pub fn for_op(op: &str) -> Self {
        match op {
            "clone" | "push" | "fetch" => Self::Stream,
            _ => Self::Discard,
        }
    }
}

/// Result of a successful git command.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Captured stdout, credentials scrubbed.
    pub stdout: String,
    /// Captured stderr, credentials scrubbed.
    pub stderr: String,
    /// Exit code.
    pub exit_code: i32,
    /// Wall-clock duration.
    pub duration: Duration,
}

// ============================================================================
// Runner
// ============================================================================

/// Runs git with credential injection and output handling.
#[derive(Clone)]
pub struct GitRunner {
    git: PathBuf,
    token: Option<String>,
    timeout: Duration,
    formatter: ProgressFormatter,
    sink: LineSink,
    progress: Option<Arc<dyn ProgressReporter>>,
    env: Vec<(String, String)>,
}

impl fmt::Debug for GitRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRunner")
            .field("git", &self.git)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("timeout", &self.timeout)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl GitRunner {
    /// Locates git on PATH.
    pub fn new() -> Result<Self, GitError> {
        let git = which::which("git").map_err(|_| GitError::NotFound)?;
        Ok(Self::with_executable(git))
    }

    /// Uses a specific git executable.
    pub fn with_executable(git: impl Into<PathBuf>) -> Self {
        Self {
            git: git.into(),
            token: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            formatter: ProgressFormatter::default(),
            sink: Arc::new(|line| eprintln!("{line}")),
            progress: None,
            env: Vec::new(),
        }
    }

    /// Token injected into `clone` and `push` URLs.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Overrides the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends streamed lines somewhere other than stderr.
    #[must_use]
    pub fn with_sink(mut self, sink: LineSink) -> Self {
        self.sink = sink;
        self
    }

    /// Forwards object counts from streamed output.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Adds an environment variable to every command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Path of the git executable.
    pub fn git_path(&self) -> &Path {
        &self.git
    }

    /// Final argv: for `clone` and `push`, the URL in position 1 gets the
    /// token embedded when it is https.
    pub fn prepare_args(&self, args: &[&str]) -> Result<Vec<String>, GitError> {
        let mut argv: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        if let (Some(token), Some(op)) = (self.token.as_deref(), args.first()) {
            if matches!(*op, "clone" | "push") && argv.len() > 1 {
                argv[1] = inject_token(&argv[1], token)?;
            }
        }
        Ok(argv)
    }

    /// Runs one git command in `dir`.
    #[instrument(skip(self, dir, args, cancel), fields(op = args.first().copied().unwrap_or_default(), dir = %dir.display()))]
    pub async fn run(
        &self,
        dir: &Path,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<GitOutput, GitError> {
        let op = args.first().copied().unwrap_or_default().to_string();
        let mode = OutputMode::for_op(&op);
        let argv = self.prepare_args(args)?;
        debug!(args = ?display_args(args), mode = ?mode, "Running git");

        let mut command = Command::new(&self.git);
        command
            .args(&argv)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in NON_INTERACTIVE_ENV {
            command.env(key, value);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GitError::NotFound,
            _ => GitError::Io(e),
        })?;

        let handler = (mode == OutputMode::Stream).then(|| self.stream_handler());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let work = async {
            let (out, err, status) = tokio::join!(
                capture(stdout, handler.clone()),
                capture(stderr, handler.clone()),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let (stdout, stderr, status) = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(op = %op, "Git command cancelled");
                return Err(GitError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, work) => match result {
                Ok(output) => output?,
                Err(_) => {
                    warn!(op = %op, timeout = ?self.timeout, "Git command timed out");
                    return Err(GitError::Timeout { op, timeout: self.timeout });
                }
            },
        };

        let token = self.token.as_deref();
        let output = GitOutput {
            stdout: scrub(token, &stdout),
            stderr: scrub(token, &stderr),
            exit_code: status.code().unwrap_or(-1),
            duration: started.elapsed(),
        };
        debug!(exit_code = output.exit_code, duration = ?output.duration, "Git command finished");

        if !status.success() {
            return Err(GitError::Command {
                message: failure_message(&output),
                op,
            });
        }
        Ok(output)
    }

    /// Runs a command under `policy`, retrying transient failures.
    pub async fn run_with_retry(
        &self,
        dir: &Path,
        args: &[&str],
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<GitOutput, GitError> {
        let op = args.first().copied().unwrap_or("git");
        retry::run_with_retry(op, policy, cancel, |_| self.run(dir, args, cancel)).await
    }

    fn stream_handler(&self) -> LineSink {
        let formatter = self.formatter.clone();
        let sink = Arc::clone(&self.sink);
        let progress = self.progress.clone();
        let token = self.token.clone();

        Arc::new(move |segment: &str| {
            if let (Some(progress), Some((current, total))) =
                (&progress, ProgressFormatter::counts(segment))
            {
                progress.update(current, total);
            }
            if let Some(line) = formatter.format_line(segment) {
                sink(&scrub(token.as_deref(), &line));
            }
        })
    }
}

/// Reads a child stream to the end, feeding `handler` segment by segment.
async fn capture<R: AsyncRead + Unpin>(
    reader: Option<R>,
    handler: Option<LineSink>,
) -> std::io::Result<String> {
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut captured = Vec::new();
    let mut pending = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        if let Some(handler) = &handler {
            for segment in split_segments(&mut pending, chunk) {
                handler(&segment);
            }
        }
        captured.extend_from_slice(chunk);
        if captured.len() > MAX_CAPTURE * 2 {
            captured.drain(..captured.len() - MAX_CAPTURE);
        }
    }

    if let Some(handler) = &handler {
        if !pending.is_empty() {
            handler(&String::from_utf8_lossy(&pending));
        }
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

fn scrub(token: Option<&str>, text: &str) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, REDACTED),
        _ => text.to_string(),
    }
}

fn display_args(args: &[&str]) -> Vec<String> {
    args.iter()
        .map(|a| if a.contains("://") { redact_url(a) } else { (*a).to_string() })
        .collect()
}

fn failure_message(output: &GitOutput) -> String {
    let source = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    let lines: Vec<&str> = source
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let tail = lines[lines.len().saturating_sub(FAILURE_TAIL_LINES)..].join("\n");

    if tail.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        format!("exit code {}: {tail}", output.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn runner() -> Option<GitRunner> {
        GitRunner::new().ok()
    }

    #[test]
    fn test_output_modes() {
        assert_eq!(OutputMode::for_op("clone"), OutputMode::Stream);
        assert_eq!(OutputMode::for_op("push"), OutputMode::Stream);
        assert_eq!(OutputMode::for_op("remote"), OutputMode::Discard);
        assert_eq!(OutputMode::for_op("commit"), OutputMode::Discard);
    }

    #[test]
    fn test_prepare_args_injects_for_clone_and_push() {
        let runner = GitRunner::with_executable("git").with_token(Some("ghp_tok".to_string()));

        let clone = runner
            .prepare_args(&["clone", "https://github.com/o/r.git", "."])
            .unwrap();
        assert_eq!(clone[1], "https://ghp_tok@github.com/o/r.git");

        let push = runner
            .prepare_args(&["push", "https://github.com/o/mirror.git", "--all"])
            .unwrap();
        assert_eq!(push[1], "https://ghp_tok@github.com/o/mirror.git");

        let remote = runner
            .prepare_args(&["remote", "add", "target", "https://github.com/o/r.git"])
            .unwrap();
        assert_eq!(remote[3], "https://github.com/o/r.git");

        let file = runner.prepare_args(&["clone", "file:///tmp/src", "dst"]).unwrap();
        assert_eq!(file[1], "file:///tmp/src");
    }

    #[test]
    fn test_prepare_args_without_token() {
        let runner = GitRunner::with_executable("git").with_token(Some(String::new()));
        let argv = runner
            .prepare_args(&["clone", "https://github.com/o/r.git"])
            .unwrap();
        assert_eq!(argv[1], "https://github.com/o/r.git");
    }

    #[test]
    fn test_debug_redacts_token() {
        let runner = GitRunner::with_executable("git").with_token(Some("ghp_tok".to_string()));
        let debug = format!("{runner:?}");
        assert!(!debug.contains("ghp_tok"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_scrub_and_failure_message() {
        assert_eq!(
            scrub(Some("ghp_tok"), "fatal: https://ghp_tok@github.com/o/r.git"),
            format!("fatal: https://{REDACTED}@github.com/o/r.git")
        );

        let output = GitOutput {
            stdout: String::new(),
            stderr: "hint: a\r\nfatal: repository not found\n".to_string(),
            exit_code: 128,
            duration: Duration::ZERO,
        };
        assert_eq!(
            failure_message(&output),
            "exit code 128: hint: a\nfatal: repository not found"
        );
    }

    #[tokio::test]
    async fn test_run_version() {
        let Some(runner) = runner() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let dir = std::env::temp_dir();
        let output = runner
            .run(&dir, &["--version"], &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.stdout.starts_with("git version"));
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_failure_carries_op() {
        let Some(runner) = runner() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let err = runner
            .run(dir.path(), &["log", "-1"], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.op(), Some("log"));
        assert!(matches!(err, GitError::Command { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let Some(runner) = runner() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner
            .run(&std::env::temp_dir(), &["--version"], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::Cancelled));
    }

    #[tokio::test]
    async fn test_stream_mode_feeds_sink() {
        let Some(runner) = runner() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let collected = Arc::clone(&lines);
        let runner = runner.with_sink(Arc::new(move |line| {
            collected.lock().unwrap().push(line.to_string());
        }));

        let dir = tempfile::tempdir().unwrap();
        let err = runner
            .run(
                dir.path(),
                &["clone", "file:///definitely/not/a/repo", "dst"],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.op(), Some("clone"));
        let lines = lines.lock().unwrap();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| l.starts_with("   ")));
        assert!(!lines.iter().any(|l| l.contains("Cloning into")));
    }
}
