//! Shared HTTP plumbing for provider calls.

use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ApiError;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent on every provider request.
pub const USER_AGENT: &str = concat!("gittools/", env!("CARGO_PKG_VERSION"));

/// Header GitHub uses to report the remaining request quota.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Builds the shared reqwest client.
pub fn build_client() -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?)
}

// ============================================================================
// Rate Limit Detection
// ============================================================================

/// Extension trait for rate-limit signals carried in response headers.
pub trait ResponseExt {
    /// Returns true if status and headers alone mark this as rate limited.
    fn is_rate_limited(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        is_rate_limited(self.status(), self.headers())
    }
}

/// 429, or 403 with an exhausted quota header.
pub fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get(RATE_LIMIT_REMAINING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

/// Fallback for 403 responses that carry no quota header.
pub fn body_mentions_rate_limit(body: &str) -> bool {
    body.to_ascii_lowercase().contains("rate limit")
}

// ============================================================================
// Error Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extracts the provider's JSON `message`, falling back to the status text.
pub async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    message_from_body(status, &body)
}

fn message_from_body(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| format!("status {}", status.as_u16()))
}

/// Reads a header as a trimmed string.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limit_detection() {
        let empty = HeaderMap::new();
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &empty));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &empty));

        let mut exhausted = HeaderMap::new();
        exhausted.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, &exhausted));
        assert!(!is_rate_limited(StatusCode::OK, &exhausted));

        let mut remaining = HeaderMap::new();
        remaining.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("42"));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &remaining));
    }

    #[test]
    fn test_body_fallback() {
        assert!(body_mentions_rate_limit(
            r#"{"message":"API rate limit exceeded for user ID 1."}"#
        ));
        assert!(body_mentions_rate_limit("You have exceeded a secondary Rate Limit"));
        assert!(!body_mentions_rate_limit(r#"{"message":"Resource not accessible"}"#));
    }

    #[test]
    fn test_message_from_body() {
        assert_eq!(
            message_from_body(StatusCode::UNAUTHORIZED, r#"{"message":"Bad credentials"}"#),
            "Bad credentials"
        );
        assert_eq!(
            message_from_body(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "status 502"
        );
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("gittools/"));
    }
}
