//! # Core Module
//!
//! Core domain types, configuration, clock and error handling shared by the
//! alarm features.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add clock module for local-time scheduling
//! - 1.0.0: Initial creation with config, error and models modules

pub mod clock;
pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used items
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{AlarmError, TimerError};
pub use models::{
    collect_reminders, Event, Reminder, ReminderKind, ReminderSource, Settings, Task,
    DEFAULT_TASK_ALARM_DESCRIPTION,
};
