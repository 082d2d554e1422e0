//! GitHub token validation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use gittools_core::{ProviderKind, Token};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use super::api::{build_headers, GITHUB_API_BASE};
use super::models::GitHubUser;
use crate::error::ApiError;
use crate::http::{build_client, error_message, header_str};
use crate::scopes::{check_scopes, GITHUB_ADMIN_SCOPE, GITHUB_REQUIRED_SCOPES};
use crate::validator::{precheck, TokenValidator};

/// Header carrying the token's granted scopes.
const SCOPES_HEADER: &str = "x-oauth-scopes";

/// Header carrying a fine-grained or expiring token's expiry.
const EXPIRATION_HEADER: &str = "github-authentication-token-expiration";

/// Validates GitHub tokens with `GET /user`.
#[derive(Debug, Clone)]
pub struct GitHubValidator {
    http: Client,
    base_url: String,
    require_admin: bool,
}

impl GitHubValidator {
    /// Creates a validator for api.github.com.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(GITHUB_API_BASE)
    }

    /// Creates a validator for an enterprise host or a test server.
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            require_admin: false,
        })
    }

    /// Also requires the `admin:repo` scope.
    #[must_use]
    pub fn with_admin_scope(mut self) -> Self {
        self.require_admin = true;
        self
    }

    /// Scopes this validator insists on.
    pub fn required_scopes(&self) -> Vec<&'static str> {
        let mut required = GITHUB_REQUIRED_SCOPES.to_vec();
        if self.require_admin {
            required.push(GITHUB_ADMIN_SCOPE);
        }
        required
    }

    /// API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validates `token` and returns the user it belongs to, in one request.
    pub async fn validate_user(&self, token: &mut Token) -> Result<GitHubUser, ApiError> {
        precheck(token)?;
        let response = self.verify(token).await?;
        check_scopes(&token.scope, &self.required_scopes())?;

        response
            .json::<GitHubUser>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("decode /user: {e}")))
    }

    /// Calls `GET /user` and copies scope and expiry onto the token.
    #[instrument(skip(self, token), fields(base_url = %self.base_url))]
    async fn verify(&self, token: &mut Token) -> Result<Response, ApiError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .headers(build_headers(&token.value)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            debug!(status = %status, message = %message, "Token verification rejected");
            if status == StatusCode::UNAUTHORIZED {
                return Err(ApiError::BadCredentials(message));
            }
            return Err(ApiError::Verification { status, message });
        }

        let headers = response.headers();
        token.scope = header_str(headers, SCOPES_HEADER).unwrap_or_default().to_string();
        if let Some(raw) = header_str(headers, EXPIRATION_HEADER) {
            token.expires_at = Some(parse_expiration(raw)?);
        }

        debug!(scope = %token.scope, expires_at = ?token.expires_at, "Token verified");
        Ok(response)
    }
}

#[async_trait]
impl TokenValidator for GitHubValidator {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn validate(&self, token: &mut Token) -> Result<(), ApiError> {
        precheck(token)?;
        self.verify(token).await?;
        check_scopes(&token.scope, &self.required_scopes())?;
        Ok(())
    }
}

/// Parses `2025-03-04 02:13:04 UTC` or `2025-03-04 02:13:04 +0000`.
pub(crate) fn parse_expiration(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    let parsed = match raw.strip_suffix(" UTC") {
        Some(naive) => NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc()),
        None => DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z").map(|d| d.with_timezone(&Utc)),
    };
    parsed.map_err(|e| ApiError::InvalidHeader(format!("token expiration {raw:?}: {e}")))
}
