//! Authentication token value object.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TokenError;

/// Placeholder rendered instead of a token value in human-facing output.
pub const REDACTED: &str = "REDACTED";

// ============================================================================
// Token
// ============================================================================

/// A provider authentication token.
///
/// The serde form is the storage form: `{Value, ExpiresAt, Scope, CreatedAt}`
/// with the real secret. `Debug` and [`Token::redacted`] hide the value for
/// logs and terminal output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    /// The secret token string.
    pub value: String,

    /// Absolute expiry time; `None` means the token never expires.
    #[serde(default, with = "zero_time")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Space- or comma-delimited scope list.
    #[serde(default)]
    pub scope: String,

    /// When this token record was created.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// Creates a token stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] if `value` is empty.
    pub fn new(
        value: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        scope: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(Self {
            value,
            expires_at,
            scope: scope.into(),
            created_at: Utc::now(),
        })
    }

    /// Returns true if the token has a non-empty value.
    pub fn is_valid(&self) -> bool {
        !self.value.is_empty()
    }

    /// Returns true if the token has an expiry and it lies in the past.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < Utc::now())
    }

    /// Time left until expiry, negative once expired.
    ///
    /// Returns `None` for tokens that never expire.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }

    /// Returns a copy safe to print, with the value replaced by `REDACTED`.
    pub fn redacted(&self) -> Self {
        Self {
            value: REDACTED.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &REDACTED)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ============================================================================
// Zero-time expiry encoding
// ============================================================================

/// Encodes "no expiry" as the zero instant `0001-01-01T00:00:00Z`.
///
/// Existing consumers of the stored JSON expect a timestamp in `ExpiresAt`
/// at all times. Decoding also accepts `null` or a missing field.
mod zero_time {
    use chrono::{DateTime, Datelike, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const ZERO: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => at.serialize(serializer),
            None => serializer.serialize_str(ZERO),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<DateTime<Utc>>::deserialize(deserializer)?;
        Ok(raw.filter(|at| at.year() > 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_created_at() {
        let before = Utc::now();
        let token = Token::new("ghp_abc", None, "repo").unwrap();
        let after = Utc::now();

        assert!(token.created_at >= before && token.created_at <= after);
        assert_eq!(token.value, "ghp_abc");
        assert_eq!(token.scope, "repo");
    }

    #[test]
    fn test_new_rejects_empty_value() {
        let result = Token::new("", Some(Utc::now()), "repo");
        assert!(matches!(result, Err(TokenError::Invalid)));
    }

    #[test]
    fn test_never_expires_without_expiry() {
        let mut token = Token::new("x", None, "").unwrap();
        assert!(!token.is_expired());
        assert!(token.time_until_expiry().is_none());

        token.scope = "anything".to_string();
        token.created_at = DateTime::<Utc>::default();
        assert!(!token.is_expired());
    }

    #[test]
    fn test_expired_in_past() {
        let token = Token::new("x", Some(Utc::now() - Duration::hours(1)), "").unwrap();
        assert!(token.is_expired());
        assert!(token.time_until_expiry().unwrap() < Duration::zero());

        let token = Token::new("x", Some(Utc::now() + Duration::hours(1)), "").unwrap();
        assert!(!token.is_expired());
    }

    #[test]
    fn test_empty_value_is_invalid() {
        let mut token = Token::new("x", None, "").unwrap();
        token.value.clear();
        assert!(!token.is_valid());
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = Token::new("ghp_supersecret", None, "repo").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_redacted_keeps_metadata() {
        let expiry = Utc::now() + Duration::days(3);
        let token = Token::new("ghp_supersecret", Some(expiry), "repo workflow").unwrap();
        let shown = token.redacted();

        assert_eq!(shown.value, REDACTED);
        assert_eq!(shown.scope, token.scope);
        assert_eq!(shown.expires_at, token.expires_at);
    }
}
