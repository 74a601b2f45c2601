//! # Reminder Store
//!
//! Key/value persistence for events, tasks and settings. Values are JSON
//! documents in a single sqlite table; the alarm core only reads through
//! [`ReminderStore`], the UI layer writes through [`Database`].
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Export/import bundle and clear_all_data
//! - 1.0.0: Initial release with events, tasks and settings keys

use crate::core::models::{collect_reminders, Event, Reminder, Settings, Task};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const KEY_EVENTS: &str = "events";
const KEY_TASKS: &str = "tasks";
const KEY_SETTINGS: &str = "settings";

/// Read side of the reminder store consumed by the alarm core
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// All events and tasks as reminders
    async fn load_reminders(&self) -> Result<Vec<Reminder>>;

    async fn load_settings(&self) -> Result<Settings>;
}

/// Full data bundle produced by [`Database::export_data`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
    pub settings: Settings,
    /// RFC 3339 export instant
    #[serde(default)]
    pub timestamp: String,
    /// Calendar date of the export (`YYYY-MM-DD`)
    #[serde(default)]
    pub export_date: String,
}

/// sqlite-backed key/value store
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<sqlite::Connection>>,
}

impl Database {
    /// Open (or create) the store at `path`. `":memory:"` gives a private in-memory store.
    pub fn open(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)
            .map_err(|e| anyhow!("Failed to open reminder store at {}: {}", path, e))?;
        connection.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
        )?;
        info!("Opened reminder store at {path}");
        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let mut statement = connection.prepare("SELECT value FROM kv WHERE key = ?")?;
        statement.bind((1, key))?;
        if let sqlite::State::Row = statement.next()? {
            Ok(Some(statement.read::<String, _>("value")?))
        } else {
            Ok(None)
        }
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let mut statement =
            connection.prepare("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")?;
        statement.bind((1, key))?;
        statement.bind((2, value))?;
        statement.next()?;
        debug!("Stored {} bytes under '{key}'", value.len());
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let mut statement = connection.prepare("DELETE FROM kv WHERE key = ?")?;
        statement.bind((1, key))?;
        statement.next()?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| anyhow!("Corrupt '{}' record: {}", key, e)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.put_raw(key, &json)
    }

    pub async fn get_events(&self) -> Result<Vec<Event>> {
        Ok(self.get_json(KEY_EVENTS)?.unwrap_or_default())
    }

    pub async fn save_events(&self, events: &[Event]) -> Result<()> {
        self.put_json(KEY_EVENTS, &events)
    }

    pub async fn get_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.get_json(KEY_TASKS)?.unwrap_or_default())
    }

    pub async fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        self.put_json(KEY_TASKS, &tasks)
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        Ok(self.get_json(KEY_SETTINGS)?.unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_json(KEY_SETTINGS, settings)
    }

    /// Serialize events, tasks and settings into one JSON document
    pub async fn export_data(&self) -> Result<String> {
        let now = Utc::now();
        let bundle = ExportBundle {
            events: self.get_events().await?,
            tasks: self.get_tasks().await?,
            settings: self.get_settings().await?,
            timestamp: now.to_rfc3339(),
            export_date: now.format("%Y-%m-%d").to_string(),
        };
        Ok(serde_json::to_string(&bundle)?)
    }

    /// Replace events, tasks and settings with an exported bundle.
    ///
    /// Returns `false` (leaving the store untouched) when the document does not parse.
    pub async fn import_data(&self, json: &str) -> Result<bool> {
        let bundle: ExportBundle = match serde_json::from_str(json) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Rejected import: {e}");
                return Ok(false);
            }
        };

        self.save_events(&bundle.events).await?;
        self.save_tasks(&bundle.tasks).await?;
        self.save_settings(&bundle.settings).await?;
        info!(
            "Imported {} events and {} tasks",
            bundle.events.len(),
            bundle.tasks.len()
        );
        Ok(true)
    }

    /// Remove all events and tasks. Settings are kept.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.remove_raw(KEY_EVENTS)?;
        self.remove_raw(KEY_TASKS)?;
        info!("Cleared all events and tasks");
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for Database {
    async fn load_reminders(&self) -> Result<Vec<Reminder>> {
        let events = self.get_events().await?;
        let tasks = self.get_tasks().await?;
        Ok(collect_reminders(events, tasks))
    }

    async fn load_settings(&self) -> Result<Settings> {
        self.get_settings().await
    }
}
