//! GitHub validator and REST client.

mod api;
mod models;
mod validator;

pub use api::{GitHubClient, GITHUB_API_BASE};
pub use models::{CreateRepoOptions, GitHubUser, PullRequest, PullRequestOptions, Repository};
pub use validator::GitHubValidator;
