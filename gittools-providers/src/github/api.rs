//! GitHub REST API client.
//!
//! Every call funnels through [`GitHubClient::send`], which attaches the
//! auth headers and retries exactly once after a rate-limited response.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use gittools_core::{parse_repo, Token, WorkflowRun};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::models::{
    ContentInfo, CreateRepoOptions, GitHubUser, PullRequest, PullRequestOptions, Repository,
    WorkflowRunsResponse,
};
use super::validator::GitHubValidator;
use crate::error::ApiError;
use crate::http::{self, body_mentions_rate_limit, build_client, ResponseExt};

// ============================================================================
// Constants
// ============================================================================

/// GitHub API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Media type requested on every call.
const ACCEPT_VALUE: &str = "application/vnd.github.v3+json";

/// Commit message used for workflow file updates.
const WORKFLOW_COMMIT_MESSAGE: &str = "Update workflow file";

/// Builds the auth headers for a token.
pub(crate) fn build_headers(token: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(http::USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));

    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ApiError::InvalidHeader("token contains invalid characters".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    Ok(headers)
}

// ============================================================================
// API Client
// ============================================================================

/// Authenticated GitHub API client.
///
/// Construction validates the token and caches the login, so a client
/// always belongs to a known user.
pub struct GitHubClient {
    http: Client,
    headers: HeaderMap,
    base_url: String,
    username: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Validates `token` against api.github.com and builds a client.
    pub async fn new(token: &mut Token) -> Result<Self, ApiError> {
        Self::with_base_url(GITHUB_API_BASE, token).await
    }

    /// Validates `token` against `base_url` and builds a client.
    ///
    /// The token's scope and expiry are updated from the provider.
    #[instrument(skip(token))]
    pub async fn with_base_url(base_url: &str, token: &mut Token) -> Result<Self, ApiError> {
        let validator = GitHubValidator::with_base_url(base_url)?;
        Self::with_validator(&validator, token).await
    }

    /// Builds a client with a caller-configured validator.
    ///
    /// The validator's `GET /user` also supplies the login, so construction
    /// costs a single request.
    #[instrument(skip(validator, token), fields(base_url = %validator.base_url()))]
    pub async fn with_validator(
        validator: &GitHubValidator,
        token: &mut Token,
    ) -> Result<Self, ApiError> {
        let user = validator.validate_user(token).await?;
        info!(login = %user.login, "Authenticated with GitHub");

        Ok(Self {
            http: build_client()?,
            headers: build_headers(&token.value)?,
            base_url: validator.base_url().to_string(),
            username: user.login,
        })
    }

    /// Login of the authenticated user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------------

    /// Sends a request, retrying once immediately if rate limited.
    ///
    /// Statuses >= 400 become [`ApiError::Status`]; a second rate-limited
    /// response becomes [`ApiError::RateLimited`].
    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        match self.dispatch(&method, path, body).await {
            Err(e) if e.is_rate_limited() => {
                warn!(error = %e, "Rate limited, retrying once");
                self.dispatch(&method, path, body).await
            }
            other => other,
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, "Response received");

        if response.is_rate_limited() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RateLimited { status, body });
        }
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::FORBIDDEN && body_mentions_rate_limit(&body) {
                return Err(ApiError::RateLimited { status, body });
            }
            return Err(ApiError::Status { status, body });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, path = %path, "Failed to decode response");
            ApiError::InvalidResponse(format!("{path}: {e}"))
        })
    }

    // ------------------------------------------------------------------------
    // Users and repositories
    // ------------------------------------------------------------------------

    /// Fetches the authenticated user.
    pub async fn get_user(&self) -> Result<GitHubUser, ApiError> {
        self.send_json(Method::GET, "/user", None).await
    }

    /// Creates a repository owned by the authenticated user.
    #[instrument(skip(self, opts), fields(name = %opts.name, private = opts.private))]
    pub async fn create_repository(&self, opts: &CreateRepoOptions) -> Result<Repository, ApiError> {
        let body = to_body(opts)?;
        let repo: Repository = self.send_json(Method::POST, "/user/repos", Some(&body)).await?;
        info!(full_name = %repo.full_name, "Created repository");
        Ok(repo)
    }

    /// Forks `owner/repo` into the authenticated user's account.
    #[instrument(skip(self))]
    pub async fn create_fork(&self, repo: &str) -> Result<Repository, ApiError> {
        let (owner, name) = parse_repo(repo)?;
        let path = format!("/repos/{owner}/{name}/forks");
        let fork: Repository = self.send_json(Method::POST, &path, None).await?;
        info!(full_name = %fork.full_name, "Fork requested");
        Ok(fork)
    }

    /// Opens a pull request.
    #[instrument(skip(self, opts), fields(owner = %opts.owner, repo = %opts.repo, head = %opts.head))]
    pub async fn create_pull_request(
        &self,
        opts: &PullRequestOptions,
    ) -> Result<PullRequest, ApiError> {
        let path = format!("/repos/{}/{}/pulls", opts.owner, opts.repo);
        let body = to_body(opts)?;
        self.send_json(Method::POST, &path, Some(&body)).await
    }

    /// Creates or replaces a workflow file.
    ///
    /// Looks up the current blob sha first; a 404 means the file is new.
    #[instrument(skip(self, content))]
    pub async fn create_or_update_workflow(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), ApiError> {
        let api_path = format!("/repos/{owner}/{repo}/contents/{path}");

        let sha = match self.send_json::<ContentInfo>(Method::GET, &api_path, None).await {
            Ok(info) => Some(info.sha),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        debug!(exists = sha.is_some(), "Checked workflow file");

        let mut body = json!({
            "message": WORKFLOW_COMMIT_MESSAGE,
            "content": STANDARD.encode(content),
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha);
        }

        self.send(Method::PUT, &api_path, Some(&body)).await?;
        info!("Workflow file written");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Dispatches a `workflow_dispatch` event.
    #[instrument(skip(self, inputs))]
    pub async fn trigger_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow_id: &str,
        git_ref: &str,
        inputs: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        let path = format!("/repos/{owner}/{repo}/actions/workflows/{workflow_id}/dispatches");
        let body = json!({ "ref": git_ref, "inputs": inputs });
        self.send(Method::POST, &path, Some(&body)).await?;
        info!("Workflow dispatched");
        Ok(())
    }

    /// Fetches one workflow run.
    pub async fn get_workflow_run(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<WorkflowRun, ApiError> {
        let path = format!("/repos/{owner}/{repo}/actions/runs/{run_id}");
        self.send_json(Method::GET, &path, None).await
    }

    /// Lists runs of a workflow, newest first.
    pub async fn list_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowRun>, ApiError> {
        let path = format!("/repos/{owner}/{repo}/actions/workflows/{workflow_id}/runs");
        let response: WorkflowRunsResponse = self.send_json(Method::GET, &path, None).await?;
        Ok(response.workflow_runs)
    }

    /// Downloads the logs archive of a run.
    #[instrument(skip(self))]
    pub async fn get_workflow_logs(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<u8>, ApiError> {
        let path = format!("/repos/{owner}/{repo}/actions/runs/{run_id}/logs");
        let response = self.send(Method::GET, &path, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Polls a run until it completes.
    ///
    /// `on_status` sees every polled state. Cancellation is checked while
    /// a poll is in flight and while sleeping between polls.
    #[instrument(skip(self, cancel, on_status))]
    pub async fn wait_for_run<F>(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
        poll_interval: Duration,
        cancel: &CancellationToken,
        mut on_status: F,
    ) -> Result<WorkflowRun, ApiError>
    where
        F: FnMut(&WorkflowRun) + Send,
    {
        loop {
            let run = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ApiError::Cancelled),
                run = self.get_workflow_run(owner, repo, run_id) => run?,
            };

            on_status(&run);
            if run.is_completed() {
                info!(conclusion = ?run.conclusion, "Workflow run completed");
                return Ok(run);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ApiError::Cancelled),
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::InvalidResponse(format!("encode request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_headers() {
        let headers = build_headers("ghp_secret").unwrap();
        assert_eq!(headers[ACCEPT], ACCEPT_VALUE);
        assert_eq!(headers[AUTHORIZATION], "Bearer ghp_secret");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(headers[USER_AGENT].to_str().unwrap().starts_with("gittools/"));
    }

    #[test]
    fn test_build_headers_rejects_newline() {
        assert!(matches!(
            build_headers("ghp_bad\nvalue"),
            Err(ApiError::InvalidHeader(_))
        ));
    }
}
