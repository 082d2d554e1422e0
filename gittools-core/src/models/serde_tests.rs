//! Serde tests for the storage form of core types.
//!
//! Stored tokens are read by other tools, so the JSON field names and the
//! zero-time expiry encoding are part of the contract.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::{ProviderKind, Token};

// ============================================================================
// Token Serde Tests
// ============================================================================

#[test]
fn test_token_uses_pascal_case_fields() {
    let token = Token::new("ghp_abc", None, "repo").unwrap();
    let value: Value = serde_json::to_value(&token).unwrap();

    let obj = value.as_object().unwrap();
    let mut keys: Vec<_> = obj.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["CreatedAt", "ExpiresAt", "Scope", "Value"]);
    assert_eq!(obj["Value"], "ghp_abc");
}

#[test]
fn test_token_storage_form_keeps_secret() {
    let token = Token::new("ghp_realsecret", None, "repo").unwrap();
    let json = serde_json::to_string(&token).unwrap();
    assert!(json.contains("ghp_realsecret"));

    let shown = serde_json::to_string(&token.redacted()).unwrap();
    assert!(!shown.contains("ghp_realsecret"));
    assert!(shown.contains("REDACTED"));
}

#[test]
fn test_missing_expiry_serializes_as_zero_time() {
    let token = Token::new("x", None, "").unwrap();
    let value = serde_json::to_value(&token).unwrap();
    assert_eq!(value["ExpiresAt"], "0001-01-01T00:00:00Z");
}

#[test]
fn test_zero_time_deserializes_as_no_expiry() {
    let json = json!({
        "Value": "x",
        "ExpiresAt": "0001-01-01T00:00:00Z",
        "Scope": "repo",
        "CreatedAt": "2024-05-01T10:00:00Z"
    });
    let token: Token = serde_json::from_value(json).unwrap();
    assert!(token.expires_at.is_none());
    assert!(!token.is_expired());
}

#[test]
fn test_null_or_absent_expiry_deserializes_as_no_expiry() {
    let token: Token = serde_json::from_value(json!({
        "Value": "x",
        "ExpiresAt": null
    }))
    .unwrap();
    assert!(token.expires_at.is_none());

    let token: Token = serde_json::from_value(json!({ "Value": "x" })).unwrap();
    assert!(token.expires_at.is_none());
    assert!(token.scope.is_empty());
}

#[test]
fn test_token_roundtrip_with_expiry() {
    let expiry = Utc::now() + Duration::days(30);
    let token = Token::new("glpat-abc", Some(expiry), "api").unwrap();

    let json = serde_json::to_string(&token).unwrap();
    let parsed: Token = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, token);
}

#[test]
fn test_expiry_with_offset_is_normalised() {
    let token: Token = serde_json::from_value(json!({
        "Value": "x",
        "ExpiresAt": "2030-01-01T02:00:00+02:00"
    }))
    .unwrap();
    let expected: DateTime<Utc> = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(token.expires_at, Some(expected));
}

// ============================================================================
// ProviderKind Serde Tests
// ============================================================================

#[test]
fn test_provider_kind_serde_roundtrip_all_variants() {
    for kind in ProviderKind::all() {
        let json = serde_json::to_string(kind).unwrap();
        let deserialized: ProviderKind = serde_json::from_str(&json).unwrap();
        assert_eq!(*kind, deserialized, "Round-trip failed for {kind:?}");
    }
}

#[test]
fn test_provider_kind_serializes_uppercase() {
    assert_eq!(serde_json::to_string(&ProviderKind::GitHub).unwrap(), r#""GITHUB""#);
    assert_eq!(serde_json::to_string(&ProviderKind::GitLab).unwrap(), r#""GITLAB""#);
}
