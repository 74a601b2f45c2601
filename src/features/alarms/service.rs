//! # Alarm Service
//!
//! The application boundary of the alarm subsystem. One instance is built at
//! startup with its collaborators injected; UI saves, the control socket and
//! boot handling all go through it.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Reconcile straight from the store for the control socket
//! - 1.0.0: Initial release

use crate::core::clock::Clock;
use crate::core::error::AlarmError;
use crate::core::models::{Reminder, Settings};
use crate::database::ReminderStore;
use crate::features::alarms::delivery::AlarmDeliveryHandler;
use crate::features::alarms::scheduler::{AlarmScheduler, ArmedAlarm, ReconcileReport};
use crate::features::alarms::timer::{FiredAlarm, TimerFacility};
use crate::features::alert::session::{ActiveAlert, AlertManager};
use crate::features::recovery::RecoveryTrigger;
use chrono::NaiveTime;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct AlarmService {
    store: Arc<dyn ReminderStore>,
    scheduler: Arc<AlarmScheduler>,
    alerts: Arc<AlertManager>,
    delivery: AlarmDeliveryHandler,
    recovery: RecoveryTrigger,
}

impl AlarmService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        timers: Arc<dyn TimerFacility>,
        clock: Arc<dyn Clock>,
        alerts: Arc<AlertManager>,
        task_reminder_time: NaiveTime,
    ) -> Self {
        let scheduler = Arc::new(AlarmScheduler::new(timers, clock, task_reminder_time));
        AlarmService {
            delivery: AlarmDeliveryHandler::new(scheduler.clone(), alerts.clone()),
            recovery: RecoveryTrigger::new(store.clone(), scheduler.clone()),
            store,
            scheduler,
            alerts,
        }
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        &self.scheduler
    }

    pub fn recovery(&self) -> &RecoveryTrigger {
        &self.recovery
    }

    /// Call after any save of events, tasks or settings
    pub fn reconcile_alarms(&self, reminders: &[Reminder], settings: &Settings) -> ReconcileReport {
        let report = self.scheduler.reconcile(reminders, settings);
        surface_warnings(&report);
        report
    }

    /// Reconcile against the store's current contents
    pub async fn reconcile_from_store(&self) -> Result<ReconcileReport, AlarmError> {
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
        Ok(self.reconcile_alarms(&reminders, &settings))
    }

    /// Full rebuild. Call on process start and on the restart signal.
    pub async fn reschedule_all_alarms(&self) -> Result<ReconcileReport, AlarmError> {
        let report = self.recovery.rebuild().await?;
        surface_warnings(&report);
        Ok(report)
    }

    /// Cancel one reminder's alarm, e.g. after it was deleted
    pub fn cancel_alarm(&self, reminder_id: &str) {
        self.scheduler.cancel_reminder(reminder_id);
    }

    /// The alert surface's dismiss action. Returns false if nothing was sounding.
    pub fn dismiss_active_alert(&self) -> bool {
        self.alerts.dismiss_active()
    }

    pub fn active_alert(&self) -> Option<ActiveAlert> {
        self.alerts.active()
    }

    pub fn can_schedule_exact_alarms(&self) -> bool {
        self.scheduler.can_schedule_exact()
    }

    pub fn request_exact_alarm_permission(&self) -> bool {
        self.scheduler.request_exact_permission()
    }

    pub fn on_alarm_fired(&self, fired: FiredAlarm) -> Option<JoinHandle<Option<ArmedAlarm>>> {
        self.delivery.on_alarm_fired(fired)
    }

    /// Deliver fired timers until the facility's channel closes
    pub fn spawn_dispatcher(
        self: Arc<Self>,
        mut fired_rx: mpsc::UnboundedReceiver<FiredAlarm>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Alarm dispatcher started");
            while let Some(fired) = fired_rx.recv().await {
                let service = self.clone();
                // Alert start may wait on a previous session's teardown
                let delivered =
                    tokio::task::spawn_blocking(move || service.on_alarm_fired(fired)).await;
                if let Err(e) = delivered {
                    warn!("Alarm delivery task failed: {e}");
                }
            }
            info!("Alarm dispatcher stopped");
        })
    }
}

fn surface_warnings(report: &ReconcileReport) {
    if report.exact_permission_denied {
        warn!(
            "⚠️ Exact alarms are not permitted: alarms may fire late. \
             Grant exact alarm permission to restore on-time delivery."
        );
    }
}
