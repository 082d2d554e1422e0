//! Terminal progress output.

use std::sync::Mutex;
use std::time::Instant;

use gittools_core::{ProgressReporter, RunStatus, WorkflowRun};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

// ============================================================================
// Console Progress
// ============================================================================

#[derive(Default)]
struct OperationState {
    name: String,
    started: Option<Instant>,
    objects: Option<(u64, u64)>,
}

/// [`ProgressReporter`] that writes operation milestones to stderr.
///
/// Per-object updates are only tallied; git's own formatted lines already
/// show transfer progress.
pub struct ConsoleProgress {
    quiet: bool,
    state: Mutex<OperationState>,
}

impl ConsoleProgress {
    /// Creates a reporter; `quiet` suppresses everything but errors.
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            state: Mutex::new(OperationState::default()),
        }
    }

    fn elapsed_secs(state: &OperationState) -> f64 {
        state.started.map_or(0.0, |s| s.elapsed().as_secs_f64())
    }
}

impl ProgressReporter for ConsoleProgress {
    fn start(&self, operation: &str) {
        if let Ok(mut state) = self.state.lock() {
            *state = OperationState {
                name: operation.to_string(),
                started: Some(Instant::now()),
                objects: None,
            };
        }
        if !self.quiet {
            eprintln!("==> {operation}");
        }
    }

    fn update(&self, current: u64, total: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.objects = Some((current, total));
        }
    }

    fn complete(&self) {
        if self.quiet {
            return;
        }
        if let Ok(state) = self.state.lock() {
            let detail = match state.objects {
                Some((_, total)) => format!("{total} objects, {:.1}s", Self::elapsed_secs(&state)),
                None => format!("{:.1}s", Self::elapsed_secs(&state)),
            };
            eprintln!("{GREEN}✓{RESET} {} {DIM}({detail}){RESET}", state.name);
        }
    }

    fn error(&self, message: &str) {
        let name = self
            .state
            .lock()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        eprintln!("{RED}✗{RESET} {name} failed: {message}");
    }
}

// ============================================================================
// Workflow Tracker
// ============================================================================

/// Prints workflow run status transitions.
pub struct WorkflowTracker {
    name: String,
    quiet: bool,
    last: Option<RunStatus>,
    started: Instant,
}

impl WorkflowTracker {
    /// Starts tracking a run of the named workflow.
    pub fn new(name: impl Into<String>, quiet: bool) -> Self {
        Self {
            name: name.into(),
            quiet,
            last: None,
            started: Instant::now(),
        }
    }

    /// Records a polled state, printing when the status changed.
    ///
    /// Returns true if a line was printed.
    pub fn observe(&mut self, run: &WorkflowRun) -> bool {
        if self.last == Some(run.status) {
            return false;
        }
        self.last = Some(run.status);
        if self.quiet {
            return false;
        }
        eprintln!("{}", self.describe(run));
        true
    }

    /// Status line for a run.
    pub fn describe(&self, run: &WorkflowRun) -> String {
        let elapsed = self.started.elapsed().as_secs();
        match (run.status, run.conclusion.as_deref()) {
            (RunStatus::Completed, Some("success")) => {
                format!("{GREEN}✓{RESET} {} #{} succeeded ({elapsed}s)", self.name, run.id)
            }
            (RunStatus::Completed, conclusion) => format!(
                "{RED}✗{RESET} {} #{} finished: {} ({elapsed}s)",
                self.name,
                run.id,
                conclusion.unwrap_or("unknown")
            ),
            (status, _) => format!("  {} #{}: {}", self.name, run.id, status.as_str()),
        }
    }
}
