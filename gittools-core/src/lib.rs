// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gittools Core
//!
//! Core types, models, and traits shared by every gittools crate.
//!
//! This crate has no I/O of its own. It provides:
//!
//! - Domain models (tokens, providers, repository ids, workflow runs)
//! - Error kinds for the token lifecycle
//! - Trait seams implemented by the storage, refresh and CLI layers
//!
//! ## Key Types
//!
//! ### Tokens
//! - [`Token`] - Authentication token value object
//! - [`ProviderKind`] - Hosting provider, detectable from a token's prefix
//!
//! ### Remote Entities
//! - [`RepoRef`] - Canonical `owner/repo` identifier
//! - [`WorkflowRun`] - Read model of an Actions workflow run
//!
//! ### Traits
//! - [`TokenStorage`] - Key/value token persistence
//! - [`RefreshHandler`] - Caller-supplied token refresh capability
//! - [`ProgressReporter`] - Caller-supplied progress sink

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::{CoreError, ScopeError, TokenError};

// Re-export all model types
pub use models::{
    // Provider types
    detect_provider,
    ProviderKind,
    // Repository types
    parse_repo,
    RepoRef,
    // Token types
    Token,
    REDACTED,
    // Workflow types
    RunStatus,
    WorkflowRun,
};

// Re-export traits
pub use traits::{NoopProgress, ProgressReporter, RefreshHandler, TokenStorage};
