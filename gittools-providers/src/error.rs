//! Provider API errors.

use gittools_core::{CoreError, TokenError};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from token validation and provider API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Local token check or scope policy failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The provider rejected the credentials (HTTP 401).
    #[error("bad credentials: {0}")]
    BadCredentials(String),

    /// The "who am I" call failed with a non-success status.
    #[error("token verification failed ({status}): {message}")]
    Verification {
        /// Response status.
        status: StatusCode,
        /// Provider's error message, or the status when none was sent.
        message: String,
    },

    /// Rate limited, and the single retry was rate limited too.
    #[error("GitHub API rate limit exceeded: {status}: {body}")]
    RateLimited {
        /// Response status (403 or 429).
        status: StatusCode,
        /// Response body.
        body: String,
    },

    /// Any other response with status >= 400.
    #[error("GitHub API error: {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, verbatim.
        body: String,
    },

    /// Transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A success response that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A header that could not be built or parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Malformed repository or provider input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The caller cancelled a polling operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Verification { status, .. }
            | Self::RateLimited { status, .. }
            | Self::Status { status, .. } => Some(*status),
            Self::BadCredentials(_) => Some(StatusCode::UNAUTHORIZED),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Status { status, .. } => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns true for rate-limit failures.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true for 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Returns true when the provider reports that the resource already exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                *status == StatusCode::UNPROCESSABLE_ENTITY
                    && body.to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    /// Returns true for authentication and scope failures.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::BadCredentials(_)
                | Self::Token(TokenError::Invalid | TokenError::Expired | TokenError::NoScopes | TokenError::Scope(_))
        )
    }
}
