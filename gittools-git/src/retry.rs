//! Retry policy for transient git failures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GitError;

/// Markers of transient failures, matched case-insensitively against git's
/// output.
const RETRYABLE_MARKERS: &[&str] = &["http 429", "rate limit", "authentication failed"];

/// Bounded retry with linearly increasing delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay unit; retry `i` waits `i * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Returns true if git's output points at a transient failure.
pub fn is_retryable_output(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Runs `f` until it succeeds, fails permanently, or attempts run out.
///
/// Only [`GitError::Command`] failures whose message passes
/// [`is_retryable_output`] are retried. The wait between attempts races
/// `cancel`.
pub async fn run_with_retry<T, F, Fut>(
    op: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, GitError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GitError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(GitError::Command { message, .. }) if is_retryable_output(&message) => {
                last = message;
            }
            Err(e) => return Err(e),
        }

        if attempt == attempts {
            break;
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(op = %op, attempt, delay = ?delay, error = %last, "Transient git failure, retrying");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(op = %op, "Cancelled while waiting to retry");
                return Err(GitError::Cancelled);
            }
            () = tokio::time::sleep(delay) => {}
        }
    }

    Err(GitError::RetriesExhausted {
        op: op.to_string(),
        attempts,
        last,
    })
}
