//! Configuration for delegation sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upstream API base URL
pub const DEFAULT_BASE_URL: &str = "https://cosmos-api.polkachu.com";

/// Default retries beyond the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default HTTP request timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of accounts fetched concurrently
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default per-account timeout (seconds)
pub const DEFAULT_ACCOUNT_TIMEOUT_SECS: u64 = 10;

/// Sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream fetcher configuration
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Cycle configuration
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Upstream API base URL
    pub base_url: String,

    /// HTTP request timeout (seconds)
    pub timeout_secs: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl FetcherConfig {
    /// Fetcher config pointed at `base_url`, other fields default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// HTTP request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff base
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total attempts per fetch
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Sync cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Accounts fetched concurrently
    pub max_concurrent: usize,

    /// Per-account timeout (seconds)
    pub account_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            account_timeout_secs: DEFAULT_ACCOUNT_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Per-account timeout
    pub fn account_timeout(&self) -> Duration {
        Duration::from_secs(self.account_timeout_secs)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("SYNC_UPSTREAM_URL") {
            config.fetcher.base_url = url;
        }

        if let Some(retries) = parse_env("SYNC_MAX_RETRIES")? {
            config.fetcher.max_retries = retries;
        }

        if let Some(delay) = parse_env("SYNC_RETRY_DELAY_MS")? {
            config.fetcher.retry_delay_ms = delay;
        }

        if let Some(timeout) = parse_env("SYNC_HTTP_TIMEOUT_SECS")? {
            config.fetcher.timeout_secs = timeout;
        }

        if let Some(concurrent) = parse_env("SYNC_MAX_CONCURRENT")? {
            config.sync.max_concurrent = concurrent;
        }

        if let Some(timeout) = parse_env("SYNC_ACCOUNT_TIMEOUT_SECS")? {
            config.sync.account_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.base_url.trim().is_empty() {
            return Err(Error::Config("fetcher.base_url must not be empty".to_string()));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(Error::Config("fetcher.timeout_secs must be > 0".to_string()));
        }
        if self.sync.max_concurrent == 0 {
            return Err(Error::Config("sync.max_concurrent must be >= 1".to_string()));
        }
        if self.sync.account_timeout_secs == 0 {
            return Err(Error::Config(
                "sync.account_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
