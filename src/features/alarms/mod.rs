//! # Alarms Feature
//!
//! Turns reminders into armed timers and fired timers into alerts.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.2.0: Recurring events roll forward
//! - 1.1.0: Inexact fallback without exact permission
//! - 1.0.0: Initial release

pub mod delivery;
pub mod scheduler;
pub mod service;
pub mod timer;

pub use delivery::AlarmDeliveryHandler;
pub use scheduler::{AlarmScheduler, ArmedAlarm, ReconcileReport, SkipReason};
pub use service::AlarmService;
pub use timer::{FiredAlarm, ScheduleEntry, TimerFacility, TimerMode, TimerToken, TokioTimerFacility};
