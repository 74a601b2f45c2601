//! # Alarm Delivery
//!
//! Entry point for a fired timer: hands the alarm to the alert manager and,
//! for recurring reminders, re-arms exactly the next occurrence without a
//! full reconcile.

use crate::features::alarms::scheduler::{AlarmScheduler, ArmedAlarm};
use crate::features::alarms::timer::FiredAlarm;
use crate::features::alert::session::AlertManager;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct AlarmDeliveryHandler {
    scheduler: Arc<AlarmScheduler>,
    alerts: Arc<AlertManager>,
}

impl AlarmDeliveryHandler {
    pub fn new(scheduler: Arc<AlarmScheduler>, alerts: Arc<AlertManager>) -> Self {
        AlarmDeliveryHandler { scheduler, alerts }
    }

    /// Start the alert, then re-arm in the background if the alarm recurs.
    ///
    /// Returns the re-arm task, `None` for one-time alarms. A failed re-arm
    /// is logged; the reminder is picked up again by the next full reconcile.
    /// The re-arm is dropped if alarms were disabled, or the reminder was
    /// reconciled or cancelled, after this call began.
    pub fn on_alarm_fired(&self, fired: FiredAlarm) -> Option<JoinHandle<Option<ArmedAlarm>>> {
        let planned_at = self.scheduler.generation();
        let entry = &fired.entry;
        info!(
            "⏰ Alarm fired for {} ({}) at {}",
            entry.reminder_id, entry.title, fired.fired_at
        );

        if let Err(e) = self.alerts.start(&entry.title, &entry.description) {
            error!("Could not start alert for {}: {}", entry.reminder_id, e);
        }

        if !entry.recurring {
            debug!("{} is one-time, not re-arming", entry.reminder_id);
            return None;
        }

        let Some(next) = self.scheduler.next_occurrence(&fired) else {
            warn!(
                "No next occurrence for recurring reminder {}",
                entry.reminder_id
            );
            return None;
        };

        let scheduler = self.scheduler.clone();
        Some(tokio::spawn(async move {
            let reminder_id = next.reminder_id.clone();
            match scheduler.rearm(next, planned_at) {
                Ok(Some(armed)) => {
                    info!(
                        "Re-armed {} for {} ({:?})",
                        reminder_id, armed.entry.fire_at, armed.mode
                    );
                    Some(armed)
                }
                Ok(None) => {
                    info!("Not re-arming {reminder_id}: superseded since it fired");
                    None
                }
                Err(e) => {
                    warn!("Could not re-arm {reminder_id}, it resumes on next reconcile: {e}");
                    None
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, FixedClock};
    use crate::features::alarms::timer::{ScheduleEntry, TimerMode, TimerToken};
    use crate::features::alert::session::{AlertOutputs, DEFAULT_DISMISS_TIMEOUT};
    use crate::testing::{RecordingAudioOutput, RecordingSurface, RecordingTimers, RecordingVibrator};
    use crate::core::models::{Reminder, ReminderKind, ReminderSource, Settings, Task};
    use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime};

    struct Rig {
        timers: Arc<RecordingTimers>,
        clock: Arc<FixedClock>,
        surface: Arc<RecordingSurface>,
        alerts: Arc<AlertManager>,
        scheduler: Arc<AlarmScheduler>,
        handler: AlarmDeliveryHandler,
    }

    fn rig() -> Rig {
        let timers = Arc::new(RecordingTimers::new());
        let clock = Arc::new(
            FixedClock::at_local(
                NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                FixedOffset::east_opt(0).unwrap(),
            )
            .unwrap(),
        );
        let surface = Arc::new(RecordingSurface::default());
        let alerts = Arc::new(AlertManager::new(AlertOutputs {
            audio: Arc::new(RecordingAudioOutput::default()),
            vibrator: Arc::new(RecordingVibrator::default()),
            surface: surface.clone(),
            dismiss_timeout: DEFAULT_DISMISS_TIMEOUT,
        }));
        let scheduler = Arc::new(AlarmScheduler::new(
            timers.clone(),
            clock.clone(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        ));
        let handler = AlarmDeliveryHandler::new(scheduler.clone(), alerts.clone());
        Rig {
            timers,
            scheduler,
            clock,
            surface,
            alerts,
            handler,
        }
    }

    fn fired(id: &str, source: ReminderSource, recurring: bool, at: chrono::DateTime<chrono::Utc>) -> FiredAlarm {
        FiredAlarm {
            entry: ScheduleEntry {
                token: TimerToken::for_reminder(id),
                fire_at: at,
                reminder_id: id.to_string(),
                recurring,
                source,
                title: format!("Alarm {id}"),
                description: "body".to_string(),
            },
            fired_at: at,
        }
    }

    #[tokio::test]
    async fn test_one_time_alarm_alerts_without_rearm() {
        let rig = rig();
        let now = rig.clock.now();
        assert!(rig
            .handler
            .on_alarm_fired(fired("e1", ReminderSource::Event, false, now))
            .is_none());

        assert_eq!(rig.surface.shown_titles(), vec!["Alarm e1".to_string()]);
        assert!(rig.timers.calls_for(TimerToken::for_reminder("e1")).is_empty());
        rig.alerts.dismiss_active();
    }

    #[tokio::test]
    async fn test_recurring_task_rearms_next_morning() {
        let rig = rig();
        let now = rig.clock.now();
        let armed = rig
            .handler
            .on_alarm_fired(fired("t1", ReminderSource::Task, true, now))
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(armed.entry.fire_at, now + Duration::days(1));
        assert_eq!(armed.mode, TimerMode::Exact);
        assert_eq!(
            rig.timers.calls_for(TimerToken::for_reminder("t1")),
            vec!["cancel".to_string(), "register:Exact".to_string()]
        );
        assert!(rig.alerts.active().is_some());
        rig.alerts.dismiss_active();
    }

    #[tokio::test]
    async fn test_failed_rearm_still_alerts() {
        let rig = rig();
        rig.timers.fail_token(TimerToken::for_reminder("e2"));
        let now = rig.clock.now();
        let rearmed = rig
            .handler
            .on_alarm_fired(fired("e2", ReminderSource::Event, true, now))
            .unwrap()
            .await
            .unwrap();

        assert!(rearmed.is_none());
        assert_eq!(rig.timers.armed_count(), 0);
        assert_eq!(rig.alerts.active().unwrap().title, "Alarm e2");
        rig.alerts.dismiss_active();
    }

    fn recurring_task(id: &str) -> Reminder {
        Reminder::Task(Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            completed: false,
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            kind: ReminderKind::Recurring,
            skipped_dates: Default::default(),
            alarm_enabled: true,
        })
    }

    #[tokio::test]
    async fn test_global_disable_while_sounding_blocks_rearm() {
        let rig = rig();
        let now = rig.clock.now();
        let rearm = rig
            .handler
            .on_alarm_fired(fired("t1", ReminderSource::Task, true, now))
            .unwrap();

        // Settings saved while the alert sounds, before the re-arm task runs
        let disabled = Settings {
            notifications_enabled: true,
            alarms_enabled: false,
        };
        rig.scheduler.reconcile(&[recurring_task("t1")], &disabled);

        assert!(rearm.await.unwrap().is_none());
        assert_eq!(rig.timers.armed_count(), 0);
        rig.alerts.dismiss_active();
    }

    #[tokio::test]
    async fn test_cancelled_reminder_is_not_rearmed() {
        let rig = rig();
        let now = rig.clock.now();
        let rearm = rig
            .handler
            .on_alarm_fired(fired("t1", ReminderSource::Task, true, now))
            .unwrap();
        rig.scheduler.cancel_reminder("t1");

        assert!(rearm.await.unwrap().is_none());
        assert_eq!(rig.timers.fire_at(TimerToken::for_reminder("t1")), None);
        rig.alerts.dismiss_active();
    }
}
