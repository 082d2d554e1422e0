// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gittools Git
//!
//! Runs the `git` executable for gittools.
//!
//! This crate provides:
//!
//! - **GitRunner**: non-interactive git subprocesses with per-command
//!   timeouts, token injection into https remotes, and scrubbed errors
//! - **ProgressFormatter**: condenses git's transfer progress lines
//! - **RetryPolicy**: bounded linear backoff for transient failures
//! - **clone_repository**: direct clones and private mirrors
//!
//! Only `https://` and `file://` remotes are accepted; SSH remotes are
//! rejected before git is started.
//!
//! ## Usage
//!
//! ```ignore
//! use gittools_git::{clone_repository, CloneOptions};
//!
//! let options = CloneOptions::new("https://github.com/owner/repo.git")
//!     .with_target("https://github.com/me/private-repo.git")
//!     .with_token(token_value)
//!     .with_strip_workflows(true);
//!
//! clone_repository(&options).await?;
//! ```

pub mod clone;
pub mod error;
pub mod process;
pub mod progress;
pub mod retry;
pub mod url;

pub use clone::{clone_repository, CloneOptions, CLONE_OPERATION, DEFAULT_CLONE_TIMEOUT};
pub use error::GitError;
pub use process::{GitOutput, GitRunner, LineSink, OutputMode, DEFAULT_COMMAND_TIMEOUT};
pub use progress::{ProgressFormatter, DEFAULT_INDENT};
pub use retry::{is_retryable_output, run_with_retry, RetryPolicy};
pub use crate::url::{inject_token, is_ssh_url, redact_url, validate_url, SSH_REJECTED};
