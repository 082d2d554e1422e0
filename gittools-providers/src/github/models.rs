//! GitHub request and response payloads.

use gittools_core::WorkflowRun;
use serde::{Deserialize, Serialize};

/// Response from `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    /// Login (username).
    pub login: String,

    /// Numeric user id.
    #[serde(default)]
    pub id: u64,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Public email, if any.
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /user/repos`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateRepoOptions {
    /// Repository name.
    pub name: String,
    /// Short description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Create as private.
    pub private: bool,
    /// Create an initial commit.
    pub auto_init: bool,
}

/// Body of `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullRequestOptions {
    /// Owner of the repository receiving the PR.
    #[serde(skip)]
    pub owner: String,
    /// Repository receiving the PR.
    #[serde(skip)]
    pub repo: String,
    /// PR title.
    pub title: String,
    /// PR description.
    pub body: String,
    /// Source branch, `owner:branch` for cross-repository PRs.
    pub head: String,
    /// Target branch.
    pub base: String,
}

/// Repository as returned by create and fork calls.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    #[serde(default)]
    pub full_name: String,
    /// HTTPS clone URL.
    #[serde(default)]
    pub clone_url: String,
    /// Web URL.
    #[serde(default)]
    pub html_url: String,
    /// Visibility.
    #[serde(default)]
    pub private: bool,
}

/// Pull request as returned by `POST .../pulls`.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    /// PR number.
    pub number: u64,
    /// Web URL.
    #[serde(default)]
    pub html_url: String,
}

/// Response from `GET .../actions/workflows/{id}/runs`.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRunsResponse {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

/// The part of `GET .../contents/{path}` we need.
#[derive(Debug, Deserialize)]
pub(crate) struct ContentInfo {
    pub sha: String,
}
