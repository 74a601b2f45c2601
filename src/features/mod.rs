//! # Features
//!
//! Feature modules of the alarm daemon, each carrying its own version.

pub mod alarms;
pub mod alert;
pub mod recovery;

pub use alarms::{
    AlarmDeliveryHandler, AlarmScheduler, AlarmService, FiredAlarm, ReconcileReport, ScheduleEntry,
    TimerFacility, TimerMode, TimerToken, TokioTimerFacility,
};
pub use alert::{AlertManager, AlertOutputs, AlertSession, SessionState};
pub use recovery::RecoveryTrigger;

/// Metadata for one feature module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub toggleable: bool,
}

/// Crate version reported over IPC
pub fn get_routine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_features() -> Vec<FeatureInfo> {
    vec![
        FeatureInfo {
            id: "alarms",
            name: "Alarms",
            version: "1.2.0",
            toggleable: true,
        },
        FeatureInfo {
            id: "alert",
            name: "Alert Session",
            version: "1.1.0",
            toggleable: false,
        },
        FeatureInfo {
            id: "recovery",
            name: "Restart Recovery",
            version: "1.0.0",
            toggleable: false,
        },
    ]
}
