// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gittools Providers
//!
//! Hosting-provider integrations for gittools.
//!
//! - **Validators**: [`GitHubValidator`] and [`GitLabValidator`] check a
//!   token locally, confirm it with a live `GET /user`, copy the granted
//!   scopes (and GitHub's expiry) onto it, then enforce the scope policy
//! - **GitHub client**: [`GitHubClient`] wraps the REST endpoints used for
//!   mirroring and Actions, with a single immediate retry on rate limits
//!
//! | Provider | Auth header | Scope header | Required scopes |
//! |----------|-------------|--------------|-----------------|
//! | GitHub | `Authorization: Bearer` | `X-OAuth-Scopes` | `repo`, `workflow` (+ `admin:repo`) |
//! | GitLab | `PRIVATE-TOKEN` | `X-Gitlab-Scopes` | `api` |
//!
//! ## Usage
//!
//! ```ignore
//! use gittools_core::Token;
//! use gittools_providers::GitHubClient;
//!
//! let mut token = Token::new(value, None, "")?;
//! let client = GitHubClient::new(&mut token).await?;
//! let runs = client.list_workflow_runs("owner", "repo", "sync.yml").await?;
//! ```

pub mod error;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod scopes;
pub mod validator;

pub use error::ApiError;
pub use reqwest::StatusCode;
pub use github::{
    CreateRepoOptions, GitHubClient, GitHubUser, GitHubValidator, PullRequest, PullRequestOptions,
    Repository, GITHUB_API_BASE,
};
pub use gitlab::{GitLabValidator, GITLAB_API_BASE};
pub use scopes::{check_scopes, parse_scopes};
pub use validator::{validator_for, validator_with_base_url, TokenValidator};
