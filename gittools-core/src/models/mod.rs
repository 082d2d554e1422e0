//! Domain models for gittools.
//!
//! ## Submodules
//!
//! - [`token`] - Authentication token value object
//! - [`provider`] - Provider kinds and token-prefix detection
//! - [`repo`] - `owner/repo` identifiers
//! - [`workflow`] - Actions workflow run read model

mod provider;
mod repo;
mod token;
mod workflow;

// Re-export everything at the models level
pub use provider::{detect_provider, ProviderKind};
pub use repo::{parse_repo, RepoRef};
pub use token::{Token, REDACTED};
pub use workflow::{RunStatus, WorkflowRun};

#[cfg(test)]
mod serde_tests;
