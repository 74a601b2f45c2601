//! # Alarm Errors
//!
//! Failure taxonomy for scheduling and delivery. Per-reminder failures are
//! collected into reconcile reports rather than aborting a pass; only a store
//! that cannot be read fails an operation outright.

use std::fmt;

/// Errors surfaced by the alarm subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// Exact scheduling is not permitted; the timer was degraded to inexact
    PermissionDenied,
    /// The platform refused the timer for a reason other than permission
    TimerRegistrationFailed { reminder_id: String, reason: String },
    /// Reminders or settings could not be read
    PersistenceUnavailable(String),
    /// An alert session could not enter the sounding state
    SessionStart(String),
}

impl fmt::Display for AlarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmError::PermissionDenied => {
                write!(f, "exact alarm permission denied, using inexact timers")
            }
            AlarmError::TimerRegistrationFailed {
                reminder_id,
                reason,
            } => write!(f, "failed to register alarm for {reminder_id}: {reason}"),
            AlarmError::PersistenceUnavailable(reason) => {
                write!(f, "reminder store unavailable: {reason}")
            }
            AlarmError::SessionStart(reason) => write!(f, "failed to start alert session: {reason}"),
        }
    }
}

impl std::error::Error for AlarmError {}

/// Errors reported by a [`TimerFacility`](crate::features::alarms::TimerFacility)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    PermissionDenied,
    Failed(String),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::PermissionDenied => write!(f, "permission denied"),
            TimerError::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for TimerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_reminder() {
        let err = AlarmError::TimerRegistrationFailed {
            reminder_id: "e1".to_string(),
            reason: "table full".to_string(),
        };
        assert_eq!(err.to_string(), "failed to register alarm for e1: table full");
    }

    #[test]
    fn test_converts_into_anyhow() {
        let err: anyhow::Error = AlarmError::PersistenceUnavailable("locked".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<AlarmError>(),
            Some(AlarmError::PersistenceUnavailable(_))
        ));
    }
}
