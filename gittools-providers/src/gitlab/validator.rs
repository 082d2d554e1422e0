use async_trait::async_trait;
use gittools_core::{ProviderKind, Token};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::http::{build_client, error_message, header_str};
use crate::scopes::{check_scopes, GITLAB_REQUIRED_SCOPES};
use crate::validator::{precheck, TokenValidator};

/// GitLab API base URL.
pub const GITLAB_API_BASE: &str = "https://gitlab.com/api/v4";

const SCOPES_HEADER: &str = "x-gitlab-scopes";

/// Personal access tokens carry `api` when GitLab omits the header.
const DEFAULT_SCOPE: &str = "api";

/// Validates GitLab tokens with `GET /user`.
#[derive(Debug, Clone)]
pub struct GitLabValidator {
    http: Client,
    base_url: String,
}

impl GitLabValidator {
    /// Creates a validator for gitlab.com.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(GITLAB_API_BASE)
    }

    /// Creates a validator for a self-managed instance or a test server.
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self, token), fields(base_url = %self.base_url))]
    async fn verify(&self, token: &mut Token) -> Result<(), ApiError> {
        let mut headers = HeaderMap::new();
        let mut private = HeaderValue::from_str(&token.value)
            .map_err(|_| ApiError::InvalidHeader("token contains invalid characters".to_string()))?;
        private.set_sensitive(true);
        headers.insert("private-token", private);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let url = format!("{}/user", self.base_url);
        let response = self.http.get(&url).headers(headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            debug!(status = %status, message = %message, "Token verification rejected");
            if status == StatusCode::UNAUTHORIZED {
                return Err(ApiError::BadCredentials(message));
            }
            return Err(ApiError::Verification { status, message });
        }

        let raw = header_str(response.headers(), SCOPES_HEADER)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCOPE);
        token.scope = normalize_scopes(raw);

        debug!(scope = %token.scope, "Token verified");
        Ok(())
    }
}

#[async_trait]
impl TokenValidator for GitLabValidator {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn validate(&self, token: &mut Token) -> Result<(), ApiError> {
        precheck(token)?;
        self.verify(token).await?;
        check_scopes(&token.scope, GITLAB_REQUIRED_SCOPES)?;
        Ok(())
    }
}

/// `api, read_user` becomes `api read_user`.
fn normalize_scopes(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
