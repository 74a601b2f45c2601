//! # Reminder Models
//!
//! Events, tasks and settings as the reminder store persists them, plus the
//! [`Reminder`] sum type the alarm scheduler operates on.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Task alarm title/description defaults, `alarm_enabled` on tasks
//! - 1.0.0: Initial release

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Description used for task alarms when the task has none
pub const DEFAULT_TASK_ALARM_DESCRIPTION: &str = "Don't forget to complete this task today!";

/// Whether a reminder happens once or every day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    #[default]
    OneTime,
    Recurring,
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderKind::OneTime => write!(f, "onetime"),
            ReminderKind::Recurring => write!(f, "recurring"),
        }
    }
}

impl std::str::FromStr for ReminderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "onetime" | "one_time" => Ok(ReminderKind::OneTime),
            "recurring" => Ok(ReminderKind::Recurring),
            _ => Err(anyhow::anyhow!("Invalid reminder kind: {}", s)),
        }
    }
}

/// Which entity a reminder (and therefore a fired alarm) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderSource {
    Event,
    Task,
}

/// A calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Wall-clock time of the event (`HH:MM`), display only
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ReminderKind,
    pub date: NaiveDate,
    #[serde(default)]
    pub alarm_enabled: bool,
    /// Absolute alarm instant in epoch milliseconds
    #[serde(default)]
    pub alarm_timestamp: Option<i64>,
    #[serde(default)]
    pub alarm_notified: bool,
}

/// A checklist task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub date: NaiveDate,
    #[serde(rename = "type", default)]
    pub kind: ReminderKind,
    /// Dates hidden from the checklist of a recurring task
    #[serde(default)]
    pub skipped_dates: BTreeSet<NaiveDate>,
    #[serde(default = "default_true")]
    pub alarm_enabled: bool,
}

/// Application-wide toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub alarms_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            notifications_enabled: true,
            alarms_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The unit the alarm scheduler works on
#[derive(Debug, Clone, PartialEq)]
pub enum Reminder {
    Event(Event),
    Task(Task),
}

impl Reminder {
    pub fn id(&self) -> &str {
        match self {
            Reminder::Event(e) => &e.id,
            Reminder::Task(t) => &t.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Reminder::Event(e) => &e.title,
            Reminder::Task(t) => &t.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Reminder::Event(e) => &e.description,
            Reminder::Task(t) => &t.description,
        }
    }

    pub fn occurrence_date(&self) -> NaiveDate {
        match self {
            Reminder::Event(e) => e.date,
            Reminder::Task(t) => t.date,
        }
    }

    pub fn kind(&self) -> ReminderKind {
        match self {
            Reminder::Event(e) => e.kind,
            Reminder::Task(t) => t.kind,
        }
    }

    pub fn source(&self) -> ReminderSource {
        match self {
            Reminder::Event(_) => ReminderSource::Event,
            Reminder::Task(_) => ReminderSource::Task,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.kind() == ReminderKind::Recurring
    }

    pub fn alarm_enabled(&self) -> bool {
        match self {
            Reminder::Event(e) => e.alarm_enabled,
            Reminder::Task(t) => t.alarm_enabled,
        }
    }

    /// Stored alarm instant (epoch ms). Tasks never store one.
    pub fn alarm_timestamp(&self) -> Option<i64> {
        match self {
            Reminder::Event(e) => e.alarm_timestamp,
            Reminder::Task(_) => None,
        }
    }

    pub fn skipped_dates(&self) -> Option<&BTreeSet<NaiveDate>> {
        match self {
            Reminder::Event(_) => None,
            Reminder::Task(t) => Some(&t.skipped_dates),
        }
    }

    /// Title shown on the alert surface
    pub fn alert_title(&self) -> String {
        match self {
            Reminder::Event(e) => e.title.clone(),
            Reminder::Task(t) => format!("Task Reminder: {}", t.title),
        }
    }

    /// Description shown on the alert surface
    pub fn alert_description(&self) -> String {
        match self {
            Reminder::Event(e) => e.description.clone(),
            Reminder::Task(t) if t.description.is_empty() => {
                DEFAULT_TASK_ALARM_DESCRIPTION.to_string()
            }
            Reminder::Task(t) => t.description.clone(),
        }
    }
}

impl From<Event> for Reminder {
    fn from(event: Event) -> Self {
        Reminder::Event(event)
    }
}

impl From<Task> for Reminder {
    fn from(task: Task) -> Self {
        Reminder::Task(task)
    }
}

/// Merge events and tasks into one reminder list, events first
pub fn collect_reminders(events: Vec<Event>, tasks: Vec<Task>) -> Vec<Reminder> {
    events
        .into_iter()
        .map(Reminder::from)
        .chain(tasks.into_iter().map(Reminder::from))
        .collect()
}
