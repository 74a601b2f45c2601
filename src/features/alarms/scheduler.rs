//! # Alarm Scheduler
//!
//! Derives the timers that should exist from the reminder list and settings,
//! and applies them to the [`TimerFacility`] by cancel-then-register. Nothing
//! about armed timers is remembered between passes: every pass recomputes
//! the full set, so repeated passes with the same input converge on the same
//! timer table.
//!
//! - **Version**: 1.3.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.3.0: Re-arms planned before a later disable or cancel are refused
//! - 1.2.0: Recurring events roll forward to their next future occurrence
//! - 1.1.0: Inexact fallback when exact scheduling is refused mid-pass
//! - 1.0.0: Initial release with reconcile and cancel_all

use crate::core::clock::Clock;
use crate::core::error::{AlarmError, TimerError};
use crate::core::models::{Reminder, ReminderKind, ReminderSource, Settings};
use crate::features::alarms::timer::{
    FiredAlarm, ScheduleEntry, TimerFacility, TimerMode, TimerToken,
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Why a reminder produced no timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlarmDisabled,
    /// No alarm timestamp (or one that is out of range)
    MissingFireTime,
    /// Fire instant at or before the reconciliation instant
    Stale { fire_at: DateTime<Utc> },
    /// The local wall-clock time does not exist (DST gap)
    Unresolvable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlarmDisabled => write!(f, "alarm disabled"),
            SkipReason::MissingFireTime => write!(f, "no fire time"),
            SkipReason::Stale { fire_at } => write!(f, "stale (was due {fire_at})"),
            SkipReason::Unresolvable => write!(f, "local time does not exist"),
        }
    }
}

/// A timer that was successfully registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedAlarm {
    pub entry: ScheduleEntry,
    pub mode: TimerMode,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub armed: Vec<ArmedAlarm>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failures: Vec<AlarmError>,
    /// Cancel calls issued during the pass
    pub cancelled: usize,
    /// At least one timer was degraded to inexact
    pub exact_permission_denied: bool,
}

impl ReconcileReport {
    /// Soft warnings for the caller: the permission gap (once) plus every
    /// per-reminder failure
    pub fn warnings(&self) -> Vec<AlarmError> {
        let mut warnings = Vec::with_capacity(self.failures.len() + 1);
        if self.exact_permission_denied {
            warnings.push(AlarmError::PermissionDenied);
        }
        warnings.extend(self.failures.iter().cloned());
        warnings
    }

    pub fn armed_ids(&self) -> Vec<&str> {
        self.armed
            .iter()
            .map(|a| a.entry.reminder_id.as_str())
            .collect()
    }
}

/// What the scheduler last did to the timer table.
///
/// Every pass that cancels or registers bumps `generation` and stamps the
/// tokens it touched, so a re-arm planned earlier can tell it is stale.
struct TableLedger {
    generation: u64,
    alarms_enabled: bool,
    touched: HashMap<TimerToken, u64>,
}

impl TableLedger {
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

pub struct AlarmScheduler {
    timers: Arc<dyn TimerFacility>,
    clock: Arc<dyn Clock>,
    task_reminder_time: NaiveTime,
    /// Serializes cancel/register pairs on the shared timer table
    table: Mutex<TableLedger>,
}

impl AlarmScheduler {
    pub fn new(
        timers: Arc<dyn TimerFacility>,
        clock: Arc<dyn Clock>,
        task_reminder_time: NaiveTime,
    ) -> Self {
        AlarmScheduler {
            timers,
            clock,
            task_reminder_time,
            table: Mutex::new(TableLedger {
                generation: 0,
                alarms_enabled: true,
                touched: HashMap::new(),
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, TableLedger> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current table generation. Capture it before planning work that
    /// is applied later with [`AlarmScheduler::rearm`].
    pub fn generation(&self) -> u64 {
        self.table().generation
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn can_schedule_exact(&self) -> bool {
        self.timers.can_schedule_exact()
    }

    pub fn request_exact_permission(&self) -> bool {
        self.timers.request_exact_permission()
    }

    /// Next instant `reminder` should fire after `now`
    pub fn next_fire_at(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SkipReason> {
        if !reminder.alarm_enabled() {
            return Err(SkipReason::AlarmDisabled);
        }

        match (reminder.source(), reminder.kind()) {
            (ReminderSource::Task, ReminderKind::Recurring) => self
                .clock
                .next_daily(now, self.task_reminder_time)
                .ok_or(SkipReason::Unresolvable),
            (ReminderSource::Event, ReminderKind::Recurring) => {
                let stored = stored_instant(reminder)?;
                Ok(roll_forward_daily(stored, now))
            }
            (_, ReminderKind::OneTime) => {
                let fire_at = stored_instant(reminder)?;
                if fire_at <= now {
                    Err(SkipReason::Stale { fire_at })
                } else {
                    Ok(fire_at)
                }
            }
        }
    }

    /// Pure derivation of the timers that should exist at `now`
    pub fn plan(
        &self,
        reminders: &[Reminder],
        now: DateTime<Utc>,
    ) -> (Vec<ScheduleEntry>, Vec<(String, SkipReason)>) {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for reminder in reminders {
            match self.next_fire_at(reminder, now) {
                Ok(fire_at) => entries.push(ScheduleEntry {
                    token: TimerToken::for_reminder(reminder.id()),
                    fire_at,
                    reminder_id: reminder.id().to_string(),
                    recurring: reminder.is_recurring(),
                    source: reminder.source(),
                    title: reminder.alert_title(),
                    description: reminder.alert_description(),
                }),
                Err(reason) => skipped.push((reminder.id().to_string(), reason)),
            }
        }

        (entries, skipped)
    }

    /// Bring the timer table in line with `reminders` and `settings`.
    ///
    /// With alarms disabled every derivable token is cancelled. Otherwise each
    /// planned reminder is cancelled then registered, and reminders that plan
    /// to nothing are cancelled. Failures are collected per reminder.
    pub fn reconcile(&self, reminders: &[Reminder], settings: &Settings) -> ReconcileReport {
        let mut table = self.table();
        let generation = table.bump();
        table.alarms_enabled = settings.alarms_enabled;
        let mut report = ReconcileReport::default();

        if !settings.alarms_enabled {
            report.cancelled = self.cancel_tokens(&mut table, reminders);
            info!(
                "Alarms disabled: cancelled {} timers",
                report.cancelled
            );
            return report;
        }

        let now = self.clock.now();
        let (entries, skipped) = self.plan(reminders, now);

        for (reminder_id, reason) in &skipped {
            let token = TimerToken::for_reminder(reminder_id);
            self.timers.cancel(token);
            table.touched.insert(token, generation);
            report.cancelled += 1;
            debug!("Skipping alarm for {reminder_id}: {reason}");
        }
        report.skipped = skipped;

        let exact_allowed = self.timers.can_schedule_exact();
        if !exact_allowed {
            warn!("Exact alarms not permitted, arming inexact timers");
            report.exact_permission_denied = !entries.is_empty();
        }

        for entry in entries {
            self.timers.cancel(entry.token);
            table.touched.insert(entry.token, generation);
            report.cancelled += 1;
            match self.register_with_fallback(&entry, exact_allowed) {
                Ok((mode, degraded)) => {
                    report.exact_permission_denied |= degraded;
                    report.armed.push(ArmedAlarm { entry, mode });
                }
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(e);
                }
            }
        }

        info!(
            "Reconciled {} reminders: {} armed, {} skipped, {} failed",
            reminders.len(),
            report.armed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    /// Cancel the timer of every reminder, whatever its enabled state.
    /// Returns the number of cancel calls issued.
    pub fn cancel_all(&self, reminders: &[Reminder]) -> usize {
        let mut table = self.table();
        table.bump();
        let cancelled = self.cancel_tokens(&mut table, reminders);
        debug!("Cancelled {cancelled} timers");
        cancelled
    }

    /// Cancel the timer of a single reminder (e.g. one just deleted)
    pub fn cancel_reminder(&self, reminder_id: &str) {
        let mut table = self.table();
        let generation = table.bump();
        let token = TimerToken::for_reminder(reminder_id);
        self.timers.cancel(token);
        table.touched.insert(token, generation);
        debug!("Cancelled alarm for {reminder_id}");
    }

    /// Cancel then register exactly one timer
    pub fn arm(&self, entry: ScheduleEntry) -> Result<ArmedAlarm, AlarmError> {
        let mut table = self.table();
        self.arm_locked(&mut table, entry)
    }

    /// Arm `entry` only if nothing changed its token since `planned_at`.
    ///
    /// Returns `Ok(None)` when alarms were disabled, or the token was
    /// reconciled or cancelled, after the entry was planned.
    pub fn rearm(
        &self,
        entry: ScheduleEntry,
        planned_at: u64,
    ) -> Result<Option<ArmedAlarm>, AlarmError> {
        let mut table = self.table();
        if !table.alarms_enabled {
            debug!("Alarms disabled, dropping re-arm of {}", entry.reminder_id);
            return Ok(None);
        }
        if let Some(&touched) = table.touched.get(&entry.token) {
            if touched > planned_at {
                debug!(
                    "{} changed since generation {planned_at}, dropping re-arm",
                    entry.reminder_id
                );
                return Ok(None);
            }
        }
        self.arm_locked(&mut table, entry).map(Some)
    }

    fn arm_locked(
        &self,
        table: &mut TableLedger,
        entry: ScheduleEntry,
    ) -> Result<ArmedAlarm, AlarmError> {
        let generation = table.bump();
        self.timers.cancel(entry.token);
        table.touched.insert(entry.token, generation);
        let exact_allowed = self.timers.can_schedule_exact();
        let (mode, _) = self.register_with_fallback(&entry, exact_allowed)?;
        Ok(ArmedAlarm { entry, mode })
    }

    /// The occurrence following a fired recurring alarm, `None` for one-time alarms
    pub fn next_occurrence(&self, fired: &FiredAlarm) -> Option<ScheduleEntry> {
        let entry = &fired.entry;
        if !entry.recurring {
            return None;
        }

        let now = self.clock.now();
        let fire_at = match entry.source {
            ReminderSource::Event => {
                roll_forward_daily(entry.fire_at + Duration::days(1), now.max(fired.fired_at))
            }
            ReminderSource::Task => self
                .clock
                .next_daily(now.max(fired.fired_at), self.task_reminder_time)?,
        };

        Some(ScheduleEntry {
            fire_at,
            ..entry.clone()
        })
    }

    fn cancel_tokens(&self, table: &mut TableLedger, reminders: &[Reminder]) -> usize {
        let generation = table.generation;
        for reminder in reminders {
            let token = TimerToken::for_reminder(reminder.id());
            self.timers.cancel(token);
            table.touched.insert(token, generation);
        }
        reminders.len()
    }

    /// Register `entry`, degrading to inexact if exact is not (or no longer)
    /// permitted. Returns the mode used and whether it was degraded.
    fn register_with_fallback(
        &self,
        entry: &ScheduleEntry,
        exact_allowed: bool,
    ) -> Result<(TimerMode, bool), AlarmError> {
        let mode = if exact_allowed {
            TimerMode::Exact
        } else {
            TimerMode::Inexact
        };

        let result = match self.timers.register(entry, mode) {
            Err(TimerError::PermissionDenied) if mode == TimerMode::Exact => {
                warn!(
                    "Exact alarm refused for {}, falling back to inexact",
                    entry.reminder_id
                );
                self.timers
                    .register(entry, TimerMode::Inexact)
                    .map(|()| (TimerMode::Inexact, true))
            }
            other => other.map(|()| (mode, !exact_allowed)),
        };

        match result {
            Ok((mode, degraded)) => {
                debug!(
                    "Armed {} ({:?}) at {} [{}]",
                    entry.reminder_id, mode, entry.fire_at, entry.token
                );
                Ok((mode, degraded))
            }
            Err(e) => Err(AlarmError::TimerRegistrationFailed {
                reminder_id: entry.reminder_id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn stored_instant(reminder: &Reminder) -> Result<DateTime<Utc>, SkipReason> {
    reminder
        .alarm_timestamp()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or(SkipReason::MissingFireTime)
}

/// First instant `at + n days` (n >= 0) strictly after `now`
fn roll_forward_daily(at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if at > now {
        return at;
    }
    let behind = (now - at).num_milliseconds();
    let days = behind / Duration::days(1).num_milliseconds() + 1;
    at + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::models::{Event, Task};
    use crate::testing::RecordingTimers;
    use chrono::{FixedOffset, NaiveDate};

    fn clock_at(h: u32, m: u32) -> Arc<FixedClock> {
        Arc::new(
            FixedClock::at_local(
                NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                NaiveTime::from_hms_opt(h, m, 0).unwrap(),
                FixedOffset::east_opt(3600).unwrap(),
            )
            .unwrap(),
        )
    }

    fn scheduler(timers: &Arc<RecordingTimers>, clock: &Arc<FixedClock>) -> AlarmScheduler {
        AlarmScheduler::new(
            timers.clone(),
            clock.clone(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        )
    }

    fn event(id: &str, kind: ReminderKind, at: DateTime<Utc>) -> Reminder {
        Reminder::Event(Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            description: "desc".to_string(),
            time: None,
            kind,
            date: at.date_naive(),
            alarm_enabled: true,
            alarm_timestamp: Some(at.timestamp_millis()),
            alarm_notified: false,
        })
    }

    fn recurring_task(id: &str) -> Reminder {
        Reminder::Task(Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: String::new(),
            completed: false,
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            kind: ReminderKind::Recurring,
            skipped_dates: Default::default(),
            alarm_enabled: true,
        })
    }

    #[test]
    fn test_one_time_event_armed_at_timestamp() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let at = clock.now() + Duration::seconds(60);
        let report = scheduler(&timers, &clock)
            .reconcile(&[event("e1", ReminderKind::OneTime, at)], &Settings::default());

        assert_eq!(report.armed_ids(), vec!["e1"]);
        assert_eq!(timers.fire_at(TimerToken::for_reminder("e1")), Some(at));
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_cancel_precedes_register() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let at = clock.now() + Duration::seconds(60);
        scheduler(&timers, &clock)
            .reconcile(&[event("e1", ReminderKind::OneTime, at)], &Settings::default());

        let token = TimerToken::for_reminder("e1");
        assert_eq!(
            timers.calls_for(token),
            vec!["cancel".to_string(), "register:Exact".to_string()]
        );
    }

    #[test]
    fn test_stale_one_time_is_dropped_and_cancelled() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let at = clock.now();
        let report = sched.reconcile(&[event("e1", ReminderKind::OneTime, at)], &Settings::default());

        assert!(report.armed.is_empty());
        assert_eq!(
            report.skipped,
            vec![("e1".to_string(), SkipReason::Stale { fire_at: at })]
        );
        assert_eq!(timers.armed_count(), 0);
    }

    #[test]
    fn test_disabled_reminder_removes_existing_timer() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let at = clock.now() + Duration::hours(1);
        sched.reconcile(&[event("e1", ReminderKind::OneTime, at)], &Settings::default());
        assert_eq!(timers.armed_count(), 1);

        let mut edited = event("e1", ReminderKind::OneTime, at);
        if let Reminder::Event(ref mut e) = edited {
            e.alarm_enabled = false;
        }
        let report = sched.reconcile(&[edited], &Settings::default());
        assert_eq!(report.skipped[0].1, SkipReason::AlarmDisabled);
        assert_eq!(timers.armed_count(), 0);
    }

    #[test]
    fn test_recurring_task_before_eight_fires_today() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(7, 0);
        scheduler(&timers, &clock).reconcile(&[recurring_task("t1")], &Settings::default());

        assert_eq!(
            timers.fire_at(TimerToken::for_reminder("t1")),
            Some(clock.now() + Duration::hours(1))
        );
    }

    #[test]
    fn test_recurring_task_after_eight_fires_tomorrow() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        scheduler(&timers, &clock).reconcile(&[recurring_task("t1")], &Settings::default());

        assert_eq!(
            timers.fire_at(TimerToken::for_reminder("t1")),
            Some(clock.now() + Duration::hours(23))
        );
    }

    #[test]
    fn test_recurring_event_rolls_forward() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        // Originally due three days ago at 08:30 local
        let original = clock.now() - Duration::days(3) - Duration::minutes(30);
        let report = scheduler(&timers, &clock).reconcile(
            &[event("e1", ReminderKind::Recurring, original)],
            &Settings::default(),
        );

        let expected = clock.now() + Duration::days(1) - Duration::minutes(30);
        assert_eq!(report.armed[0].entry.fire_at, expected);
        assert!(report.armed[0].entry.recurring);
    }

    #[test]
    fn test_task_alert_text_in_entry() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let report =
            scheduler(&timers, &clock).reconcile(&[recurring_task("t1")], &Settings::default());
        let entry = &report.armed[0].entry;
        assert_eq!(entry.title, "Task Reminder: Task t1");
        assert_eq!(entry.source, ReminderSource::Task);
    }

    #[test]
    fn test_one_time_task_never_armed() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let mut task = recurring_task("t1");
        if let Reminder::Task(ref mut t) = task {
            t.kind = ReminderKind::OneTime;
        }
        let report = scheduler(&timers, &clock).reconcile(&[task], &Settings::default());
        assert_eq!(report.skipped[0].1, SkipReason::MissingFireTime);
    }

    #[test]
    fn test_permission_fallback_arms_inexact() {
        let timers = Arc::new(RecordingTimers::new());
        timers.set_exact_permitted(false);
        let clock = clock_at(9, 0);
        let at = clock.now() + Duration::minutes(5);
        let report = scheduler(&timers, &clock).reconcile(
            &[event("e1", ReminderKind::OneTime, at), recurring_task("t1")],
            &Settings::default(),
        );

        assert_eq!(report.armed.len(), 2);
        assert!(report.armed.iter().all(|a| a.mode == TimerMode::Inexact));
        let warnings = report.warnings();
        assert_eq!(warnings, vec![AlarmError::PermissionDenied]);
    }

    #[test]
    fn test_permission_revoked_mid_pass_degrades() {
        let timers = Arc::new(RecordingTimers::new());
        timers.refuse_exact_registrations();
        let clock = clock_at(9, 0);
        let at = clock.now() + Duration::minutes(5);
        let report = scheduler(&timers, &clock)
            .reconcile(&[event("e1", ReminderKind::OneTime, at)], &Settings::default());

        assert_eq!(report.armed[0].mode, TimerMode::Inexact);
        assert!(report.exact_permission_denied);
    }

    #[test]
    fn test_registration_failure_does_not_abort_batch() {
        let timers = Arc::new(RecordingTimers::new());
        timers.fail_token(TimerToken::for_reminder("e1"));
        let clock = clock_at(9, 0);
        let at = clock.now() + Duration::minutes(5);
        let report = scheduler(&timers, &clock).reconcile(
            &[
                event("e1", ReminderKind::OneTime, at),
                event("e2", ReminderKind::OneTime, at),
            ],
            &Settings::default(),
        );

        assert_eq!(report.armed_ids(), vec!["e2"]);
        assert!(matches!(
            &report.failures[0],
            AlarmError::TimerRegistrationFailed { reminder_id, .. } if reminder_id == "e1"
        ));
    }

    #[test]
    fn test_next_occurrence_for_one_time_is_none() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let report = sched.reconcile(
            &[event("e1", ReminderKind::OneTime, clock.now() + Duration::minutes(1))],
            &Settings::default(),
        );
        let fired = FiredAlarm {
            entry: report.armed[0].entry.clone(),
            fired_at: clock.now(),
        };
        assert!(sched.next_occurrence(&fired).is_none());
    }

    #[test]
    fn test_next_occurrence_for_event_is_next_day() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let at = clock.now() + Duration::minutes(1);
        let report = sched.reconcile(&[event("e1", ReminderKind::Recurring, at)], &Settings::default());

        clock.set(at);
        let fired = FiredAlarm {
            entry: report.armed[0].entry.clone(),
            fired_at: at,
        };
        let next = sched.next_occurrence(&fired).unwrap();
        assert_eq!(next.fire_at, at + Duration::days(1));
        assert_eq!(next.token, TimerToken::for_reminder("e1"));
    }

    #[test]
    fn test_rearm_dropped_after_global_disable() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let report = sched.reconcile(&[recurring_task("t1")], &Settings::default());
        let entry = report.armed[0].entry.clone();

        let planned_at = sched.generation();
        let disabled = Settings {
            notifications_enabled: true,
            alarms_enabled: false,
        };
        sched.reconcile(&[recurring_task("t1")], &disabled);

        assert_eq!(sched.rearm(entry, planned_at), Ok(None));
        assert_eq!(timers.armed_count(), 0);
    }

    #[test]
    fn test_rearm_dropped_after_cancel() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = scheduler(&timers, &clock);
        let report = sched.reconcile(
            &[recurring_task("t1"), recurring_task("t2")],
            &Settings::default(),
        );

        let planned_at = sched.generation();
        sched.cancel_reminder("t1");

        let t1 = report.armed[0].entry.clone();
        let t2 = report.armed[1].entry.clone();
        assert_eq!(sched.rearm(t1, planned_at), Ok(None));
        assert!(sched.rearm(t2, planned_at).unwrap().is_some());
        assert_eq!(timers.fire_at(TimerToken::for_reminder("t1")), None);
        assert!(timers.fire_at(TimerToken::for_reminder("t2")).is_some());
    }

    #[test]
    fn test_concurrent_passes_keep_cancel_register_pairs() {
        let timers = Arc::new(RecordingTimers::new());
        let clock = clock_at(9, 0);
        let sched = Arc::new(scheduler(&timers, &clock));
        let ids = ["a", "b", "c", "d"];
        let reminders: Vec<Reminder> = ids
            .iter()
            .map(|id| event(id, ReminderKind::OneTime, clock.now() + Duration::hours(1)))
            .collect();

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let sched = sched.clone();
                let reminders = reminders.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        if (worker + round) % 2 == 0 {
                            sched.reconcile(&reminders, &Settings::default());
                        } else {
                            let one = &reminders[round % reminders.len()..][..1];
                            let (mut entries, _) = sched.plan(one, sched.clock().now());
                            sched.arm(entries.remove(0)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        for id in ids {
            let calls = timers.calls_for(TimerToken::for_reminder(id));
            assert!(!calls.is_empty());
            for pair in calls.chunks(2) {
                assert_eq!(
                    pair.to_vec(),
                    vec!["cancel".to_string(), "register:Exact".to_string()],
                    "interleaved calls for {id}: {calls:?}"
                );
            }
        }
        assert_eq!(timers.armed_count(), ids.len());
    }

    #[test]
    fn test_roll_forward_daily() {
        let now = Utc::now();
        let future = now + Duration::hours(2);
        assert_eq!(roll_forward_daily(future, now), future);
        assert_eq!(roll_forward_daily(now, now), now + Duration::days(1));
        assert_eq!(
            roll_forward_daily(now - Duration::hours(49), now),
            now + Duration::hours(23)
        );
    }
}
