//! Configuration types for offline-catalog

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Content API access (base URL, credentials, paging, retries)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root, must end with a slash (default: "https://api.example.com/api/")
    #[serde(default = "default_base_url")]
    pub base_url: url::Url,

    /// Bearer token attached to every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Items requested per page (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout applied to every HTTP request (default: 30 seconds)
    ///
    /// A fetch that never completes would wedge the page loader's running
    /// guard, so this must stay finite.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Which rendition to request when resolving download URLs
    #[serde(default)]
    pub download_quality: DownloadQuality,

    /// Retry policy for idempotent reads (page and detail fetches)
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
            download_quality: DownloadQuality::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Video rendition used for offline downloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadQuality {
    /// Standard definition
    #[default]
    Sd,
    /// High definition
    Hd,
}

impl DownloadQuality {
    /// The rendition kind as named by the API
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadQuality::Sd => "sd",
            DownloadQuality::Hd => "hd",
        }
    }
}

/// Retry configuration for transient HTTP failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Download orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum records in progress at the transfer engine at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Interval of the progress polling timer (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub progress_poll_interval: Duration,

    /// Only dispatch over unmetered networks (default: false)
    #[serde(default)]
    pub wifi_only: bool,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            progress_poll_interval: default_poll_interval(),
            wifi_only: false,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./offline-catalog.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) - content service access
/// - [`download`](DownloadConfig) - concurrency, polling, network gating
/// - [`persistence`](PersistenceConfig) - local cache location
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Content API access
    #[serde(default)]
    pub api: ApiConfig,

    /// Download orchestration
    #[serde(default)]
    pub download: DownloadConfig,

    /// Local cache
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check the values that would otherwise stall paging or dispatch
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(Error::config("page_size", "page size must be at least 1"));
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "max_concurrent_downloads",
                "at least one concurrent download is required",
            ));
        }
        if self.download.progress_poll_interval.is_zero() {
            return Err(Error::config(
                "progress_poll_interval",
                "poll interval must be non-zero",
            ));
        }
        if self.api.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout",
                "request timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

#[allow(clippy::expect_used)]
fn default_base_url() -> url::Url {
    url::Url::parse("https://api.example.com/api/").expect("static URL is valid")
}

fn default_page_size() -> u32 {
    20
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    3
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    256
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./offline-catalog.db")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.api.page_size, 20);
        assert_eq!(config.download.max_concurrent_downloads, 3);
        assert_eq!(config.download.progress_poll_interval, Duration::from_secs(5));
        assert_eq!(config.api.download_quality, DownloadQuality::Sd);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "api": { "base_url": "http://localhost:9000/api/", "page_size": 5, "download_quality": "hd" },
            "download": { "max_concurrent_downloads": 1, "progress_poll_interval": 2, "wifi_only": true }
        }"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");
        assert_eq!(config.api.base_url.as_str(), "http://localhost:9000/api/");
        assert_eq!(config.api.page_size, 5);
        assert_eq!(config.api.download_quality, DownloadQuality::Hd);
        assert_eq!(config.api.retry.max_attempts, 3);
        assert_eq!(config.download.progress_poll_interval, Duration::from_secs(2));
        assert!(config.download.wifi_only);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent_downloads = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("max_concurrent_downloads"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.api.page_size = 0;
        assert!(config.validate().is_err());
    }
}
