//! # Configuration
//!
//! Environment-driven configuration for the alarm daemon. Call
//! `dotenvy::dotenv()` before [`Config::from_env`] to pick up a `.env` file.

use anyhow::{anyhow, Result};
use chrono::NaiveTime;
use std::time::Duration;

/// Default path of the sqlite reminder store
pub const DEFAULT_DATABASE_PATH: &str = "routine.db";

/// Default local time for recurring task alarms
pub const DEFAULT_TASK_REMINDER_TIME: &str = "08:00";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub socket_path: String,
    /// Local time of day recurring task alarms fire at
    pub task_reminder_time: NaiveTime,
    /// Whether the host timer facility starts with exact scheduling allowed
    pub exact_alarms_permitted: bool,
    /// Maximum delay applied to inexact timers
    pub inexact_window: Duration,
    /// Bounded wait for the audio worker when an alert is dismissed
    pub dismiss_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            socket_path: crate::ipc::DEFAULT_SOCKET_PATH.to_string(),
            task_reminder_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            exact_alarms_permitted: true,
            inexact_window: Duration::from_secs(60),
            dismiss_timeout: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let task_reminder_time = lookup("TASK_REMINDER_TIME")
            .unwrap_or_else(|| DEFAULT_TASK_REMINDER_TIME.to_string());
        let task_reminder_time = NaiveTime::parse_from_str(task_reminder_time.trim(), "%H:%M")
            .map_err(|e| anyhow!("Invalid TASK_REMINDER_TIME '{}': {}", task_reminder_time, e))?;

        let exact_alarms_permitted = match lookup("EXACT_ALARMS_PERMITTED") {
            Some(value) => parse_bool("EXACT_ALARMS_PERMITTED", &value)?,
            None => defaults.exact_alarms_permitted,
        };

        Ok(Config {
            database_path: lookup("ROUTINE_DB_PATH").unwrap_or(defaults.database_path),
            socket_path: lookup("ROUTINE_IPC_SOCKET").unwrap_or(defaults.socket_path),
            task_reminder_time,
            exact_alarms_permitted,
            inexact_window: Duration::from_secs(parse_u64(
                &lookup,
                "INEXACT_WINDOW_SECONDS",
                defaults.inexact_window.as_secs(),
            )?),
            dismiss_timeout: Duration::from_millis(parse_u64(
                &lookup,
                "ALERT_DISMISS_TIMEOUT_MS",
                defaults.dismiss_timeout.as_millis() as u64,
            )?),
            heartbeat_interval: Duration::from_secs(
                parse_u64(
                    &lookup,
                    "HEARTBEAT_INTERVAL_SECONDS",
                    defaults.heartbeat_interval.as_secs(),
                )?
                .max(1),
            ),
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", key, value, e)),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Invalid {} '{}': expected true/false", key, value)),
    }
}
