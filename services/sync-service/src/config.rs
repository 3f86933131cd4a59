// Configuration for the sync service

use anyhow::{Context, Result};
use delegation_sync::{Account, Config as SyncEngineConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
/// Hourly, at minute 0 (seconds-resolution cron)
pub const DEFAULT_CRON: &str = "0 0 * * * *";
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub trigger: TriggerConfig,
    pub engine: SyncEngineConfig,
    pub tracked_accounts: Vec<Account>,
}

/// When cycles run and how long each may take
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub cron: String,
    pub cycle_timeout_secs: u64,
    pub run_on_startup: bool,
    pub startup_delay_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_CRON.to_string(),
            cycle_timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            run_on_startup: true,
            startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
        }
    }
}

impl TriggerConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl Config {
    /// Load from the process environment (`.env` must already be applied)
    pub fn from_env() -> Result<Self> {
        let server_port = parse_or("SYNC_SERVICE_PORT", DEFAULT_PORT)?;

        let trigger = TriggerConfig {
            cron: env::var("SYNC_CRON").unwrap_or_else(|_| DEFAULT_CRON.to_string()),
            cycle_timeout_secs: parse_or("SYNC_CYCLE_TIMEOUT_SECS", DEFAULT_CYCLE_TIMEOUT_SECS)?,
            run_on_startup: parse_or("SYNC_RUN_ON_STARTUP", true)?,
            startup_delay_secs: parse_or("SYNC_STARTUP_DELAY_SECS", DEFAULT_STARTUP_DELAY_SECS)?,
        };

        if trigger.cycle_timeout_secs == 0 {
            anyhow::bail!("SYNC_CYCLE_TIMEOUT_SECS must be > 0");
        }

        let engine = SyncEngineConfig::from_env().context("Invalid sync engine configuration")?;

        let tracked_accounts = match env::var("TRACKED_ACCOUNTS") {
            Ok(json) => parse_tracked_accounts(&json)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            server_port,
            trigger,
            engine,
            tracked_accounts,
        })
    }
}

/// Parse the registry seed
///
/// Example: `TRACKED_ACCOUNTS='[{"id":"cosmosvaloper1...","name":"Alpha","enabled":true}]'`
pub fn parse_tracked_accounts(json: &str) -> Result<Vec<Account>> {
    serde_json::from_str(json).context("Failed to parse TRACKED_ACCOUNTS JSON")
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be valid: {}", key, e)),
        Err(_) => Ok(default),
    }
}
