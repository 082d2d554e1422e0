//! Token health monitoring and refresh.
//!
//! A [`TokenManager`] checks stored tokens for expiry headroom and replaces
//! them through a caller-supplied [`RefreshHandler`]. Each monitored key
//! gets its own background task, so a slow refresh for one key never holds
//! up the schedule of another.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use gittools_core::{RefreshHandler, Token, TokenError, TokenStorage};
use tokio::time::{interval_at, sleep, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::RefreshError;

/// Shortest period a monitor ticks at; smaller intervals are raised to it.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Callback receiving human-readable refresh progress.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Refresh Config
// ============================================================================

/// Tuning for a [`TokenManager`]. Fixed for the manager's lifetime.
#[derive(Clone)]
pub struct RefreshConfig {
    /// A token with less validity left than this is unhealthy.
    pub min_valid_time: Duration,
    /// Health-check period of each monitor.
    pub refresh_interval: Duration,
    /// Retries after the first refresh attempt.
    pub retry_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Budget for one whole refresh, retries included.
    pub refresh_timeout: Duration,
    /// Called before every attempt.
    pub progress: Option<ProgressCallback>,
}

impl RefreshConfig {
    /// Sets the minimum remaining validity.
    pub fn with_min_valid_time(mut self, min_valid_time: Duration) -> Self {
        self.min_valid_time = min_valid_time;
        self
    }

    /// Sets the monitor period, raised to at least [`MIN_REFRESH_INTERVAL`].
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(MIN_REFRESH_INTERVAL);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the pause between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the overall refresh budget.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Sets the progress callback.
    pub fn with_progress(mut self, progress: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Total handler invocations a refresh may make.
    pub fn total_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_valid_time: Duration::from_secs(24 * 60 * 60),
            refresh_interval: Duration::from_secs(60 * 60),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(1),
            refresh_timeout: Duration::from_secs(30),
            progress: None,
        }
    }
}

impl fmt::Debug for RefreshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshConfig")
            .field("min_valid_time", &self.min_valid_time)
            .field("refresh_interval", &self.refresh_interval)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

// ============================================================================
// Token Manager
// ============================================================================

/// Health checks, bounded-retry refresh and per-key background monitors.
pub struct TokenManager {
    storage: Arc<dyn TokenStorage>,
    handler: Arc<dyn RefreshHandler>,
    config: RefreshConfig,
    monitors: Mutex<HashMap<String, CancellationToken>>,
}

impl TokenManager {
    /// Creates a manager over a storage backend and refresh handler.
    pub fn new(
        storage: Arc<dyn TokenStorage>,
        handler: Arc<dyn RefreshHandler>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            storage,
            handler,
            config,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the manager's configuration.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Returns the storage backend.
    pub fn storage(&self) -> &Arc<dyn TokenStorage> {
        &self.storage
    }

    // ------------------------------------------------------------------------
    // Health & refresh
    // ------------------------------------------------------------------------

    /// Checks that the token under `key` exists and has enough validity left.
    ///
    /// # Errors
    ///
    /// Propagates storage errors. Returns [`TokenError::Expired`] when the
    /// remaining validity is below `min_valid_time`, even if the token has
    /// not literally expired yet.
    pub fn check_health(&self, key: &str) -> Result<(), TokenError> {
        let token = self.storage.retrieve(key)?;

        if !token.is_valid() {
            return Err(TokenError::Invalid);
        }

        if let Some(left) = token.time_until_expiry() {
            let healthy = left
                .to_std()
                .is_ok_and(|left| left >= self.config.min_valid_time);
            if !healthy {
                debug!(key = %key, remaining_secs = left.num_seconds(), "Token inside refresh window");
                return Err(TokenError::Expired);
            }
        }

        Ok(())
    }

    /// Refreshes the token under `key`.
    ///
    /// Equivalent to [`refresh_token_with_cancel`](Self::refresh_token_with_cancel)
    /// with a token nobody cancels.
    pub async fn refresh_token(&self, key: &str) -> Result<(), RefreshError> {
        self.refresh_token_with_cancel(key, &CancellationToken::new())
            .await
    }

    /// Refreshes the token under `key`, stopping early if `cancel` fires.
    ///
    /// Makes up to `retry_attempts + 1` handler calls within
    /// `refresh_timeout`. Each attempt gets an equal share of the budget
    /// that is left. The refreshed token replaces the stored one.
    ///
    /// # Errors
    ///
    /// - [`RefreshError::Retrieve`] if the current token cannot be read
    /// - [`RefreshError::Cancelled`] / [`RefreshError::TimedOut`] when
    ///   interrupted
    /// - [`RefreshError::Exhausted`] when every attempt failed
    /// - [`RefreshError::InvalidRefreshedToken`] / [`RefreshError::Store`]
    ///   after a successful handler call
    #[instrument(skip(self, cancel))]
    pub async fn refresh_token_with_cancel(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RefreshError> {
        let budget = self.config.refresh_timeout;
        let deadline = Instant::now() + budget;
        let total = self.config.total_attempts();

        let current = self.storage.retrieve(key).map_err(RefreshError::Retrieve)?;
        let mut last_error = String::new();

        for attempt in 1..=total {
            if attempt > 1 {
                tokio::select! {
                    () = cancel.cancelled() => return Err(RefreshError::Cancelled),
                    () = sleep_until(deadline) => return Err(RefreshError::TimedOut(budget)),
                    () = sleep(self.config.retry_delay) => {}
                }
            }

            self.report_progress(&format!(
                "Refreshing token for {key} (attempt {attempt}/{total})"
            ));

            let now = Instant::now();
            let share = deadline.saturating_duration_since(now) / (total - attempt + 1);
            let attempt_deadline = (now + share).min(deadline);

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(RefreshError::Cancelled),
                result = timeout_at(attempt_deadline, self.handler.refresh_token(&current)) => result,
            };

            match outcome {
                Ok(Ok(token)) => return self.replace_token(key, &token),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Refresh attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(attempt, share = ?share, "Refresh attempt timed out");
                    last_error = format!("attempt timed out after {share:?}");
                }
            }

            if cancel.is_cancelled() {
                return Err(RefreshError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(RefreshError::TimedOut(budget));
            }
        }

        Err(RefreshError::Exhausted {
            attempts: total,
            last: last_error,
        })
    }

    fn replace_token(&self, key: &str, token: &Token) -> Result<(), RefreshError> {
        if !token.is_valid() {
            return Err(RefreshError::InvalidRefreshedToken);
        }

        self.storage
            .store(key, token)
            .map_err(RefreshError::Store)?;

        info!(key = %key, expires_at = ?token.expires_at, "Token refreshed");
        Ok(())
    }

    fn report_progress(&self, message: &str) {
        if let Some(progress) = &self.config.progress {
            progress(message);
        }
    }

    // ------------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------------

    /// Starts a background monitor for `key`, replacing any existing one.
    ///
    /// Every `refresh_interval` the monitor runs [`check_health`](Self::check_health)
    /// and refreshes on any failure. The monitor stops when `parent` is
    /// cancelled, on [`stop_monitoring`](Self::stop_monitoring), or when the
    /// manager is dropped. Returns the monitor's cancellation token.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_monitoring(self: &Arc<Self>, parent: &CancellationToken, key: &str) -> CancellationToken {
        let cancel = parent.child_token();

        if let Some(previous) = self.lock_monitors().insert(key.to_string(), cancel.clone()) {
            debug!(key = %key, "Replacing existing monitor");
            previous.cancel();
        }

        let manager = Arc::downgrade(self);
        let period = self.config.refresh_interval;
        if period < MIN_REFRESH_INTERVAL {
            warn!(key = %key, interval = ?period, "Refresh interval too small, using minimum");
        }
        let period = period.max(MIN_REFRESH_INTERVAL);
        tokio::spawn(run_monitor(manager, key.to_string(), cancel.clone(), period));

        info!(key = %key, interval = ?period, "Started token monitor");
        cancel
    }

    /// Stops the monitor for `key`. Returns false if none was registered.
    pub fn stop_monitoring(&self, key: &str) -> bool {
        match self.lock_monitors().remove(key) {
            Some(cancel) => {
                cancel.cancel();
                info!(key = %key, "Stopped token monitor");
                true
            }
            None => false,
        }
    }

    /// Returns true if a live monitor is registered for `key`.
    pub fn is_monitoring(&self, key: &str) -> bool {
        self.lock_monitors()
            .get(key)
            .is_some_and(|cancel| !cancel.is_cancelled())
    }

    /// Keys with a live monitor, sorted.
    pub fn monitored_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock_monitors()
            .iter()
            .filter(|(_, cancel)| !cancel.is_cancelled())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stops every monitor.
    pub fn stop_all(&self) {
        for (key, cancel) in self.lock_monitors().drain() {
            debug!(key = %key, "Stopping token monitor");
            cancel.cancel();
        }
    }

    fn lock_monitors(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One monitor tick: refresh unless the token is healthy.
    ///
    /// A missing token takes the refresh path too, so a monitor keeps
    /// trying every tick until the key reappears or the monitor is stopped.
    async fn tick(&self, key: &str, cancel: &CancellationToken) {
        match self.check_health(key) {
            Ok(()) => {
                debug!(key = %key, "Token healthy");
                return;
            }
            Err(TokenError::NotFound) => {
                warn!(key = %key, "Monitored token not found, attempting refresh");
            }
            Err(e) => {
                info!(key = %key, reason = %e, "Token unhealthy, refreshing");
            }
        }

        if let Err(e) = self.refresh_token_with_cancel(key, cancel).await {
            warn!(key = %key, error = %e, "Token refresh failed");
        }
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.config)
            .field("monitors", &self.monitored_keys())
            .finish_non_exhaustive()
    }
}

/// Background loop of one monitor.
async fn run_monitor(
    manager: Weak<TokenManager>,
    key: String,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.tick(&key, &cancel).await;
    }

    debug!(key = %key, "Token monitor exited");
}
