//! # Recovery Feature
//!
//! Rebuilds the whole timer table from the reminder store after a reboot or
//! process restart, when every previously armed timer is gone.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial release

use crate::core::error::AlarmError;
use crate::database::ReminderStore;
use crate::features::alarms::scheduler::{AlarmScheduler, ReconcileReport};
use log::{error, info, warn};
use std::sync::Arc;

pub struct RecoveryTrigger {
    store: Arc<dyn ReminderStore>,
    scheduler: Arc<AlarmScheduler>,
}

impl RecoveryTrigger {
    pub fn new(store: Arc<dyn ReminderStore>, scheduler: Arc<AlarmScheduler>) -> Self {
        RecoveryTrigger { store, scheduler }
    }

    /// Load reminders and settings, then cancel everything and reconcile.
    ///
    /// Both reads complete before any timer is touched; a failed read leaves
    /// the table as it was.
    pub async fn rebuild(&self) -> Result<ReconcileReport, AlarmError> {
        let reminders = self
            .store
            .load_reminders()
            .await
            .map_err(|e| AlarmError::PersistenceUnavailable(e.to_string()))?;
        let settings = self
            .store
            .load_settings()
            .await
            .map_err(|e| AlarmError::PersistenceUnavailable(e.to_string()))?;

        let cancelled = self.scheduler.cancel_all(&reminders);
        let mut report = self.scheduler.reconcile(&reminders, &settings);
        report.cancelled += cancelled;
        Ok(report)
    }

    /// Boot / restart entry point. Safe to call repeatedly for one boot;
    /// failures are logged since nobody is around to see them.
    pub async fn on_system_restart(&self) -> Option<ReconcileReport> {
        info!("🔄 Rebuilding alarms after restart");
        match self.rebuild().await {
            Ok(report) => {
                for warning in report.warnings() {
                    warn!("Recovery: {warning}");
                }
                info!("Recovery armed {} alarms", report.armed.len());
                Some(report)
            }
            Err(e) => {
                error!("Alarm recovery failed, retrying on next launch: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, FixedClock};
    use crate::core::models::{Event, Reminder, ReminderKind, Settings};
    use crate::testing::{MemoryStore, RecordingTimers};
    use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime};

    fn event(id: &str, at: chrono::DateTime<chrono::Utc>, enabled: bool) -> Reminder {
        Reminder::Event(Event {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            time: None,
            kind: ReminderKind::OneTime,
            date: at.date_naive(),
            alarm_enabled: enabled,
            alarm_timestamp: Some(at.timestamp_millis()),
            alarm_notified: false,
        })
    }

    fn setup(store: Arc<MemoryStore>) -> (Arc<RecordingTimers>, Arc<FixedClock>, RecoveryTrigger) {
        let timers = Arc::new(RecordingTimers::new());
        let clock = Arc::new(
            FixedClock::at_local(
                NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                FixedOffset::east_opt(0).unwrap(),
            )
            .unwrap(),
        );
        let scheduler = Arc::new(AlarmScheduler::new(
            timers.clone(),
            clock.clone(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        ));
        (timers, clock, RecoveryTrigger::new(store, scheduler))
    }

    #[tokio::test]
    async fn test_restart_rearms_enabled_future_reminders() {
        let store = Arc::new(MemoryStore::default());
        let (timers, clock, recovery) = setup(store.clone());
        let soon = clock.now() + Duration::hours(1);
        store.set_reminders(vec![
            event("e1", soon, true),
            event("e2", soon, true),
            event("e3", soon, false),
            event("e4", clock.now() - Duration::hours(1), true),
        ]);

        let report = recovery.on_system_restart().await.unwrap();
        assert_eq!(report.armed_ids(), vec!["e1", "e2"]);
        assert_eq!(timers.armed_count(), 2);

        // Repeated boot broadcast
        timers.clear();
        recovery.on_system_restart().await.unwrap();
        recovery.on_system_restart().await.unwrap();
        assert_eq!(timers.armed_count(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_touches_nothing() {
        let store = Arc::new(MemoryStore::default());
        let (timers, clock, recovery) = setup(store.clone());
        store.set_reminders(vec![event("e1", clock.now() + Duration::hours(1), true)]);
        recovery.rebuild().await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            recovery.rebuild().await,
            Err(AlarmError::PersistenceUnavailable(_))
        ));
        assert!(recovery.on_system_restart().await.is_none());
        assert_eq!(timers.armed_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_settings_rebuild_to_empty() {
        let store = Arc::new(MemoryStore::default());
        let (timers, clock, recovery) = setup(store.clone());
        store.set_reminders(vec![event("e1", clock.now() + Duration::hours(1), true)]);
        store.set_settings(Settings {
            notifications_enabled: true,
            alarms_enabled: false,
        });

        let report = recovery.rebuild().await.unwrap();
        assert!(report.armed.is_empty());
        assert_eq!(timers.armed_count(), 0);
    }
}
