//! Process-environment token storage.
//!
//! One token per environment variable, JSON-encoded, named
//! `GIT_TOKEN_<KEY>`. The process environment outlives this type, so
//! [`TokenStorage::close`] does nothing. There is no cross-process
//! atomicity: concurrent processes writing the same variable race and the
//! last writer wins.

use std::env;
use std::sync::{Mutex, PoisonError};

use gittools_core::{Token, TokenError, TokenStorage};
use tracing::{debug, instrument};

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every token variable.
pub const ENV_PREFIX: &str = "GIT_TOKEN_";

/// Variables ending with this suffix carry raw setup input, not tokens.
const RESERVED_SUFFIX: &str = "_VALUE";

/// Serializes environment mutation within this process.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Returns the environment variable name for a storage key.
///
/// ASCII alphanumerics are upper-cased; every other character becomes `_`.
pub fn format_env_key(key: &str) -> String {
    let formatted: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_PREFIX}{formatted}")
}

// ============================================================================
// Env Storage
// ============================================================================

/// Token storage backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvStorage;

impl EnvStorage {
    /// Creates a new environment-backed store.
    pub fn new() -> Self {
        Self
    }
}

impl TokenStorage for EnvStorage {
    #[instrument(skip(self, token))]
    fn store(&self, key: &str, token: &Token) -> Result<(), TokenError> {
        if !token.is_valid() {
            return Err(TokenError::Invalid);
        }

        let name = format_env_key(key);
        let body = serde_json::to_string(token)?;

        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: mutation is serialized by ENV_LOCK, and the name (ASCII
        // alphanumerics and `_`) and JSON body contain no `=` or NUL.
        unsafe { env::set_var(&name, body) };

        debug!(var = %name, "Stored token in environment");
        Ok(())
    }

    #[instrument(skip(self))]
    fn retrieve(&self, key: &str) -> Result<Token, TokenError> {
        let name = format_env_key(key);
        let body = match env::var(&name) {
            Ok(body) if !body.is_empty() => body,
            Ok(_) | Err(env::VarError::NotPresent) => return Err(TokenError::NotFound),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(TokenError::StorageUnavailable(format!(
                    "{name} is not valid unicode"
                )));
            }
        };

        let token: Token = serde_json::from_str(&body)?;

        // The variable may have been edited externally since it was written.
        if !token.is_valid() {
            return Err(TokenError::Invalid);
        }
        if token.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(token)
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> Result<(), TokenError> {
        let name = format_env_key(key);

        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: see `store`.
        unsafe { env::remove_var(&name) };

        debug!(var = %name, "Removed token from environment");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, TokenError> {
        let mut keys: Vec<String> = env::vars_os()
            .filter_map(|(name, _)| name.into_string().ok())
            .filter(|name| !name.ends_with(RESERVED_SUFFIX))
            .filter_map(|name| name.strip_prefix(ENV_PREFIX).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn close(&self) -> Result<(), TokenError> {
        Ok(())
    }
}
