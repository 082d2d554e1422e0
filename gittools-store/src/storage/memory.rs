//! In-memory token storage for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use gittools_core::{Token, TokenError, TokenStorage};
use tracing::debug;

/// Token storage backed by a lock-guarded map.
///
/// Readers proceed concurrently; writers are exclusive.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Token>>, TokenError> {
        self.tokens
            .read()
            .map_err(|_| TokenError::StorageUnavailable("memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Token>>, TokenError> {
        self.tokens
            .write()
            .map_err(|_| TokenError::StorageUnavailable("memory storage lock poisoned".to_string()))
    }
}

impl TokenStorage for MemoryStorage {
    fn store(&self, key: &str, token: &Token) -> Result<(), TokenError> {
        if !token.is_valid() {
            return Err(TokenError::Invalid);
        }

        self.write()?.insert(key.to_string(), token.clone());
        debug!(key = %key, "Stored token in memory");
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Token, TokenError> {
        let tokens = self.read()?;
        let token = tokens.get(key).ok_or(TokenError::NotFound)?;

        if !token.is_valid() {
            return Err(TokenError::Invalid);
        }
        if token.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(token.clone())
    }

    fn delete(&self, key: &str) -> Result<(), TokenError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, TokenError> {
        let mut keys: Vec<String> = self.read()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn close(&self) -> Result<(), TokenError> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_roundtrip_delete_close() {
        let storage = MemoryStorage::new();
        let token = Token::new("ghp_mem", None, "repo workflow").unwrap();

        storage.store("GITHUB", &token).unwrap();
        let loaded = storage.retrieve("GITHUB").unwrap();
        assert_eq!(loaded.value, token.value);
        assert_eq!(loaded.scope, token.scope);

        storage.delete("GITHUB").unwrap();
        assert!(matches!(storage.retrieve("GITHUB"), Err(TokenError::NotFound)));

        storage.store("A", &token).unwrap();
        storage.store("B", &token).unwrap();
        assert_eq!(storage.list().unwrap(), vec!["A", "B"]);

        storage.close().unwrap();
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let storage = MemoryStorage::new();
        let token = Token::new("x", None, "").unwrap();

        storage.store("github", &token).unwrap();
        assert!(matches!(storage.retrieve("GITHUB"), Err(TokenError::NotFound)));
    }

    #[test]
    fn test_store_rejects_invalid() {
        let storage = MemoryStorage::new();
        let mut token = Token::new("x", None, "").unwrap();
        token.value.clear();

        assert!(matches!(storage.store("k", &token), Err(TokenError::Invalid)));
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_retrieve_expired() {
        let storage = MemoryStorage::new();
        let token = Token::new("x", Some(Utc::now() - Duration::seconds(1)), "").unwrap();

        storage.store("k", &token).unwrap();
        assert!(matches!(storage.retrieve("k"), Err(TokenError::Expired)));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.delete("missing").is_ok());
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = Vec::new();

        for worker in 0..16 {
            let storage = Arc::clone(&storage);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("key-{}", i % 8);
                    let token = Token::new(format!("value-{worker}-{i}"), None, "repo").unwrap();

                    storage.store(&key, &token).unwrap();
                    match storage.retrieve(&key) {
                        Ok(found) => assert!(found.value.starts_with("value-")),
                        Err(TokenError::NotFound) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    if i % 5 == 0 {
                        storage.delete(&key).unwrap();
                    }
                    let _ = storage.list().unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(storage.list().unwrap().len() <= 8);
    }
}
