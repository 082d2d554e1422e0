//! Settings file management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::refresh::RefreshConfig;

/// gittools settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// GitHub REST API base URL.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    /// GitLab REST API base URL.
    #[serde(default = "default_gitlab_api_url")]
    pub gitlab_api_url: String,
    /// Token refresh tuning.
    #[serde(default)]
    pub refresh: RefreshSettings,
    /// Workflow file dispatched by `sync run`.
    #[serde(default = "default_sync_workflow")]
    pub sync_workflow: String,
    /// Seconds between workflow status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Token refresh settings, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Minimum remaining validity before a token is refreshed.
    #[serde(default = "default_min_valid_time")]
    pub min_valid_time_secs: u64,
    /// Health-check period.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Budget for one refresh.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_gitlab_api_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}

fn default_sync_workflow() -> String {
    "sync.yml".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_min_valid_time() -> u64 {
    24 * 60 * 60
}

fn default_refresh_interval() -> u64 {
    60 * 60
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1
}

fn default_refresh_timeout() -> u64 {
    30
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            min_valid_time_secs: default_min_valid_time(),
            refresh_interval_secs: default_refresh_interval(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay(),
            refresh_timeout_secs: default_refresh_timeout(),
        }
    }
}

impl RefreshSettings {
    /// Converts to a [`RefreshConfig`] without a progress callback.
    pub fn to_refresh_config(&self) -> RefreshConfig {
        RefreshConfig::default()
            .with_min_valid_time(Duration::from_secs(self.min_valid_time_secs))
            .with_refresh_interval(Duration::from_secs(self.refresh_interval_secs))
            .with_retry_attempts(self.retry_attempts)
            .with_retry_delay(Duration::from_secs(self.retry_delay_secs))
            .with_refresh_timeout(Duration::from_secs(self.refresh_timeout_secs))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_api_url: default_github_api_url(),
            gitlab_api_url: default_gitlab_api_url(),
            refresh: RefreshSettings::default(),
            sync_workflow: default_sync_workflow(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Settings {
    /// Returns the default settings file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gittools")
            .join("config.json")
    }

    /// Loads settings from the default path.
    pub fn load() -> Result<Self, StoreError> {
        Self::load_from(&Self::default_path())
    }

    /// Loads settings from a specific path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;

        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Saves settings to the default path.
    pub fn save(&self) -> Result<(), StoreError> {
        self.save_to(&Self::default_path())
    }

    /// Saves settings to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Rejects settings the tools cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (name, url) in [
            ("github_api_url", &self.github_api_url),
            ("gitlab_api_url", &self.gitlab_api_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(StoreError::Config(format!("{name} must be an http(s) URL: {url}")));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(StoreError::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.refresh.refresh_interval_secs == 0 {
            return Err(StoreError::Config(
                "refresh.refresh_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between workflow status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
