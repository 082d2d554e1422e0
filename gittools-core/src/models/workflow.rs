//! Actions workflow run read model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Run Status
// ============================================================================

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for a runner.
    Queued,
    /// Currently executing.
    InProgress,
    /// Finished; see the run's conclusion.
    Completed,
    /// Any status this client does not model (`waiting`, `requested`, ...).
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Returns the API spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Workflow Run
// ============================================================================

/// A workflow run as reported by the provider.
///
/// Never cached; always fetched fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Numeric run id.
    pub id: u64,
    /// Current status.
    pub status: RunStatus,
    /// Outcome (`success`, `failure`, ...), set once completed.
    #[serde(default)]
    pub conclusion: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
    /// API location of the run's logs archive.
    #[serde(default)]
    pub logs_url: String,
}

impl WorkflowRun {
    /// Returns true once the run has finished.
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Returns true if the run finished with a `success` conclusion.
    pub fn is_success(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }
}
