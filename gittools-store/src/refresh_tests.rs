//! Refresh manager tests: bounded retries, deadlines and monitors.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gittools_core::{RefreshHandler, Token, TokenError, TokenStorage};
use tokio_util::sync::CancellationToken;

use crate::error::RefreshError;
use crate::refresh::{RefreshConfig, TokenManager, MIN_REFRESH_INTERVAL};
use crate::storage::MemoryStorage;

// ============================================================================
// Test Handlers
// ============================================================================

/// Fails `failures` times, then returns a fresh token.
struct ScriptedHandler {
    calls: AtomicU32,
    failures: u32,
}

impl ScriptedHandler {
    fn failing() -> Self {
        Self::flaky(u32::MAX)
    }

    fn flaky(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshHandler for ScriptedHandler {
    async fn refresh_token(&self, _current: &Token) -> Result<Token, TokenError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(TokenError::RefreshFailed(format!("upstream error #{call}")));
        }
        Token::new(
            format!("ghp_refreshed_{call}"),
            Some(Utc::now() + chrono::Duration::days(90)),
            "repo workflow",
        )
    }
}

/// Never finishes in test time.
struct BlockingHandler;

#[async_trait]
impl RefreshHandler for BlockingHandler {
    async fn refresh_token(&self, _current: &Token) -> Result<Token, TokenError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Token::new("ghp_too_late", None, "")
    }
}

/// Returns a token with an empty value.
struct EmptyTokenHandler {
    calls: AtomicU32,
}

#[async_trait]
impl RefreshHandler for EmptyTokenHandler {
    async fn refresh_token(&self, current: &Token) -> Result<Token, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut token = current.clone();
        token.value.clear();
        Ok(token)
    }
}

/// Blocks on tokens whose value starts with `slow`, refreshes the rest.
struct SplitHandler {
    fast_calls: AtomicU32,
}

#[async_trait]
impl RefreshHandler for SplitHandler {
    async fn refresh_token(&self, current: &Token) -> Result<Token, TokenError> {
        if current.value.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        let call = self.fast_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Still inside the refresh window, so every tick refreshes again.
        Token::new(
            format!("fast_{call}"),
            Some(Utc::now() + chrono::Duration::minutes(5)),
            "",
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn soon_expiring() -> Token {
    Token::new(
        "ghp_current",
        Some(Utc::now() + chrono::Duration::hours(1)),
        "repo",
    )
    .unwrap()
}

fn fast_config() -> RefreshConfig {
    RefreshConfig::default()
        .with_retry_delay(Duration::from_millis(5))
        .with_refresh_timeout(Duration::from_secs(5))
}

fn manager_with(
    handler: Arc<dyn RefreshHandler>,
    config: RefreshConfig,
) -> (Arc<MemoryStorage>, Arc<TokenManager>) {
    let storage = Arc::new(MemoryStorage::new());
    let manager = Arc::new(TokenManager::new(storage.clone(), handler, config));
    (storage, manager)
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[test]
fn test_check_health_states() {
    let (storage, manager) = manager_with(Arc::new(ScriptedHandler::failing()), RefreshConfig::default());

    assert!(matches!(manager.check_health("GITHUB"), Err(TokenError::NotFound)));

    storage.store("GITHUB", &Token::new("x", None, "").unwrap()).unwrap();
    assert!(manager.check_health("GITHUB").is_ok());

    let far = Token::new("x", Some(Utc::now() + chrono::Duration::days(30)), "").unwrap();
    storage.store("GITHUB", &far).unwrap();
    assert!(manager.check_health("GITHUB").is_ok());

    // Not expired yet, but inside the 24h headroom.
    storage.store("GITHUB", &soon_expiring()).unwrap();
    assert!(matches!(manager.check_health("GITHUB"), Err(TokenError::Expired)));
}

// ============================================================================
// Refresh Tests
// ============================================================================

#[tokio::test]
async fn test_refresh_replaces_token() {
    let handler = Arc::new(ScriptedHandler::flaky(0));
    let (storage, manager) = manager_with(handler.clone(), fast_config());
    storage.store("GITHUB", &soon_expiring()).unwrap();

    manager.refresh_token("GITHUB").await.unwrap();

    let stored = storage.retrieve("GITHUB").unwrap();
    assert_eq!(stored.value, "ghp_refreshed_1");
    assert_eq!(handler.calls(), 1);
    assert!(manager.check_health("GITHUB").is_ok());
}

#[tokio::test]
async fn test_refresh_exhausts_after_retry_attempts_plus_one() {
    let handler = Arc::new(ScriptedHandler::failing());
    let (storage, manager) = manager_with(handler.clone(), fast_config().with_retry_attempts(2));
    storage.store("GITHUB", &soon_expiring()).unwrap();

    let err = manager.refresh_token("GITHUB").await.unwrap_err();

    assert_eq!(handler.calls(), 3);
    assert!(matches!(err, RefreshError::Exhausted { attempts: 3, .. }));
    let message = err.to_string();
    assert!(message.contains("3 attempts"), "{message}");
    assert!(message.contains("upstream error #3"), "{message}");

    // The old token is untouched.
    assert_eq!(storage.retrieve("GITHUB").unwrap().value, "ghp_current");
}

#[tokio::test]
async fn test_refresh_recovers_and_reports_progress() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let config = fast_config()
        .with_retry_attempts(3)
        .with_progress(move |msg| sink.lock().unwrap().push(msg.to_string()));

    let handler = Arc::new(ScriptedHandler::flaky(1));
    let (storage, manager) = manager_with(handler.clone(), config);
    storage.store("GITLAB", &soon_expiring()).unwrap();

    manager.refresh_token("GITLAB").await.unwrap();

    assert_eq!(handler.calls(), 2);
    assert_eq!(storage.retrieve("GITLAB").unwrap().value, "ghp_refreshed_2");

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], "Refreshing token for GITLAB (attempt 2/4)");
}

#[tokio::test]
async fn test_refresh_times_out_when_handler_blocks() {
    let config = RefreshConfig::default()
        .with_retry_attempts(2)
        .with_retry_delay(Duration::from_millis(5))
        .with_refresh_timeout(Duration::from_millis(200));
    let (storage, manager) = manager_with(Arc::new(BlockingHandler), config);
    storage.store("GITHUB", &soon_expiring()).unwrap();

    let started = std::time::Instant::now();
    let err = manager.refresh_token("GITHUB").await.unwrap_err();

    assert!(matches!(err, RefreshError::TimedOut(_)), "got {err}");
    assert!(err.is_interrupted());
    assert!(!err.to_string().contains("attempts"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_refresh_cancelled_by_caller() {
    let (storage, manager) = manager_with(Arc::new(BlockingHandler), fast_config());
    storage.store("GITHUB", &soon_expiring()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = manager
        .refresh_token_with_cancel("GITHUB", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::Cancelled));
}

#[tokio::test]
async fn test_invalid_refreshed_token_is_not_retried() {
    let handler = Arc::new(EmptyTokenHandler {
        calls: AtomicU32::new(0),
    });
    let (storage, manager) = manager_with(handler.clone(), fast_config());
    storage.store("GITHUB", &soon_expiring()).unwrap();

    let err = manager.refresh_token("GITHUB").await.unwrap_err();

    assert!(matches!(err, RefreshError::InvalidRefreshedToken));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_missing_token() {
    let handler = Arc::new(ScriptedHandler::flaky(0));
    let (_storage, manager) = manager_with(handler.clone(), fast_config());

    let err = manager.refresh_token("GITHUB").await.unwrap_err();

    assert!(matches!(err, RefreshError::Retrieve(TokenError::NotFound)));
    assert_eq!(handler.calls(), 0);
}

// ============================================================================
// Monitor Tests
// ============================================================================

#[tokio::test]
async fn test_start_monitoring_replaces_existing() {
    let (_storage, manager) = manager_with(Arc::new(ScriptedHandler::failing()), RefreshConfig::default());
    let parent = CancellationToken::new();

    let first = manager.start_monitoring(&parent, "GITHUB");
    let second = manager.start_monitoring(&parent, "GITHUB");

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert_eq!(manager.monitored_keys(), vec!["GITHUB"]);

    assert!(manager.stop_monitoring("GITHUB"));
    assert!(second.is_cancelled());
    assert!(!manager.is_monitoring("GITHUB"));
    assert!(!manager.stop_monitoring("GITHUB"));
}

#[tokio::test]
async fn test_parent_cancellation_stops_monitors() {
    let (_storage, manager) = manager_with(Arc::new(ScriptedHandler::failing()), RefreshConfig::default());
    let parent = CancellationToken::new();

    manager.start_monitoring(&parent, "GITHUB");
    manager.start_monitoring(&parent, "GITLAB");
    assert_eq!(manager.monitored_keys(), vec!["GITHUB", "GITLAB"]);

    parent.cancel();
    assert!(manager.monitored_keys().is_empty());
}

#[tokio::test]
async fn test_monitor_refreshes_unhealthy_token() {
    let handler = Arc::new(ScriptedHandler::flaky(0));
    let config = fast_config().with_refresh_interval(Duration::from_millis(20));
    let (storage, manager) = manager_with(handler.clone(), config);
    storage.store("GITHUB", &soon_expiring()).unwrap();

    manager.start_monitoring(&CancellationToken::new(), "GITHUB");
    tokio::time::sleep(Duration::from_millis(300)).await;
    manager.stop_all();

    // The first refresh yields a 90-day token, so later ticks find it healthy.
    assert_eq!(handler.calls(), 1);
    assert_eq!(storage.retrieve("GITHUB").unwrap().value, "ghp_refreshed_1");
}

#[tokio::test]
async fn test_blocked_refresh_does_not_stall_other_keys() {
    let handler = Arc::new(SplitHandler {
        fast_calls: AtomicU32::new(0),
    });
    let config = fast_config()
        .with_refresh_interval(Duration::from_millis(30))
        .with_refresh_timeout(Duration::from_secs(60));
    let (storage, manager) = manager_with(handler.clone(), config);

    let expiring = |value: &str| {
        Token::new(value, Some(Utc::now() + chrono::Duration::minutes(5)), "").unwrap()
    };
    storage.store("SLOW", &expiring("slow_token")).unwrap();
    storage.store("FAST", &expiring("fast_token")).unwrap();

    let parent = CancellationToken::new();
    manager.start_monitoring(&parent, "SLOW");
    manager.start_monitoring(&parent, "FAST");

    tokio::time::sleep(Duration::from_millis(500)).await;
    parent.cancel();

    assert!(handler.fast_calls.load(Ordering::SeqCst) >= 3);
    assert_eq!(storage.retrieve("SLOW").unwrap().value, "slow_token");
}

#[tokio::test]
async fn test_zero_refresh_interval_is_raised() {
    let config = fast_config().with_refresh_interval(Duration::ZERO);
    assert_eq!(config.refresh_interval, MIN_REFRESH_INTERVAL);

    // The public field bypasses the builder; the monitor still ticks.
    let mut config = fast_config();
    config.refresh_interval = Duration::ZERO;
    let handler = Arc::new(ScriptedHandler::flaky(0));
    let (storage, manager) = manager_with(handler.clone(), config);
    storage.store("GITHUB", &soon_expiring()).unwrap();

    let monitor = manager.start_monitoring(&CancellationToken::new(), "GITHUB");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(manager.is_monitoring("GITHUB"));
    assert_eq!(handler.calls(), 1);
    assert_eq!(storage.retrieve("GITHUB").unwrap().value, "ghp_refreshed_1");

    manager.stop_all();
    assert!(monitor.is_cancelled());
}

#[tokio::test]
async fn test_monitor_survives_missing_token() {
    let handler = Arc::new(ScriptedHandler::flaky(0));
    let config = fast_config().with_refresh_interval(Duration::from_millis(20));
    let (storage, manager) = manager_with(handler.clone(), config);

    manager.start_monitoring(&CancellationToken::new(), "GITHUB");
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Several ticks went down the refresh path, but with nothing stored
    // there is no current token to hand to the handler.
    assert_eq!(handler.calls(), 0);
    assert!(manager.is_monitoring("GITHUB"));

    // Once the key reappears the same monitor picks it up.
    storage.store("GITHUB", &soon_expiring()).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.stop_all();

    assert_eq!(handler.calls(), 1);
    assert_eq!(storage.retrieve("GITHUB").unwrap().value, "ghp_refreshed_1");
}
