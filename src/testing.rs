//! In-memory collaborators for exercising the alarm core without a runtime,
//! a database or devices. Used by the unit tests, and by `tests/` through
//! the `testing` feature.

use crate::core::error::TimerError;
use crate::core::models::{Reminder, Settings};
use crate::database::ReminderStore;
use crate::features::alarms::timer::{
    FiredAlarm, ScheduleEntry, TimerFacility, TimerMode, TimerToken,
};
use crate::features::alert::output::{
    AlertSurface, AlertView, AudioOutput, AudioSink, Vibrator,
};
use crate::features::alert::tone::VibrationPattern;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Timer table that records every call and fires only when told to
pub struct RecordingTimers {
    armed: Mutex<HashMap<TimerToken, (ScheduleEntry, TimerMode)>>,
    calls: Mutex<Vec<(TimerToken, String)>>,
    exact_permitted: AtomicBool,
    refuse_exact: AtomicBool,
    failing: Mutex<HashSet<TimerToken>>,
}

impl Default for RecordingTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTimers {
    pub fn new() -> Self {
        RecordingTimers {
            armed: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            exact_permitted: AtomicBool::new(true),
            refuse_exact: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_exact_permitted(&self, permitted: bool) {
        self.exact_permitted.store(permitted, Ordering::SeqCst);
    }

    /// Report exact as permitted but refuse every exact registration
    pub fn refuse_exact_registrations(&self) {
        self.refuse_exact.store(true, Ordering::SeqCst);
    }

    /// Make every registration for `token` fail
    pub fn fail_token(&self, token: TimerToken) {
        lock(&self.failing).insert(token);
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.armed).len()
    }

    pub fn fire_at(&self, token: TimerToken) -> Option<DateTime<Utc>> {
        lock(&self.armed).get(&token).map(|(entry, _)| entry.fire_at)
    }

    pub fn mode(&self, token: TimerToken) -> Option<TimerMode> {
        lock(&self.armed).get(&token).map(|(_, mode)| *mode)
    }

    /// Armed entries ordered by fire instant then reminder id
    pub fn armed_entries(&self) -> Vec<ScheduleEntry> {
        let mut entries: Vec<ScheduleEntry> = lock(&self.armed)
            .values()
            .map(|(entry, _)| entry.clone())
            .collect();
        entries.sort_by(|a, b| {
            a.fire_at
                .cmp(&b.fire_at)
                .then_with(|| a.reminder_id.cmp(&b.reminder_id))
        });
        entries
    }

    /// Calls made for `token`, as `"cancel"` or `"register:<Mode>"`
    pub fn calls_for(&self, token: TimerToken) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(t, _)| *t == token)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Drop every armed timer without recording cancels, as a reboot does
    pub fn clear(&self) {
        lock(&self.armed).clear();
    }

    /// Remove and return every timer due at `now`, in firing order
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<FiredAlarm> {
        let mut armed = lock(&self.armed);
        let due: Vec<TimerToken> = armed
            .iter()
            .filter(|(_, (entry, _))| entry.fire_at <= now)
            .map(|(token, _)| *token)
            .collect();

        let mut fired: Vec<FiredAlarm> = due
            .into_iter()
            .filter_map(|token| armed.remove(&token))
            .map(|(entry, _)| FiredAlarm {
                entry,
                fired_at: now,
            })
            .collect();
        fired.sort_by(|a, b| a.entry.fire_at.cmp(&b.entry.fire_at));
        fired
    }
}

impl TimerFacility for RecordingTimers {
    fn register(&self, entry: &ScheduleEntry, mode: TimerMode) -> Result<(), TimerError> {
        lock(&self.calls).push((entry.token, format!("register:{mode:?}")));

        if mode == TimerMode::Exact
            && (!self.exact_permitted.load(Ordering::SeqCst)
                || self.refuse_exact.load(Ordering::SeqCst))
        {
            return Err(TimerError::PermissionDenied);
        }
        if lock(&self.failing).contains(&entry.token) {
            return Err(TimerError::Failed("injected failure".to_string()));
        }

        lock(&self.armed).insert(entry.token, (entry.clone(), mode));
        Ok(())
    }

    fn cancel(&self, token: TimerToken) {
        lock(&self.calls).push((token, "cancel".to_string()));
        lock(&self.armed).remove(&token);
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted.load(Ordering::SeqCst)
    }

    fn request_exact_permission(&self) -> bool {
        self.can_schedule_exact()
    }
}

/// Reminder store backed by plain vectors
#[derive(Default)]
pub struct MemoryStore {
    reminders: Mutex<Vec<Reminder>>,
    settings: Mutex<Settings>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(reminders: Vec<Reminder>, settings: Settings) -> Self {
        MemoryStore {
            reminders: Mutex::new(reminders),
            settings: Mutex::new(settings),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_reminders(&self, reminders: Vec<Reminder>) {
        *lock(&self.reminders) = reminders;
    }

    pub fn set_settings(&self, settings: Settings) {
        *lock(&self.settings) = settings;
    }

    /// Make every read fail until called again with `false`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(anyhow!("store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn load_reminders(&self) -> Result<Vec<Reminder>> {
        self.check()?;
        Ok(lock(&self.reminders).clone())
    }

    async fn load_settings(&self) -> Result<Settings> {
        self.check()?;
        Ok(lock(&self.settings).clone())
    }
}

/// Audio output counting streams and samples; writes return immediately
#[derive(Default)]
pub struct RecordingAudioOutput {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    samples: Arc<AtomicUsize>,
    refuse: AtomicBool,
}

struct RecordingSink {
    closed: Arc<AtomicUsize>,
    samples: Arc<AtomicUsize>,
    is_closed: bool,
}

impl RecordingAudioOutput {
    /// Make `open` fail, as a missing device does
    pub fn refuse_open(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn samples_written(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingAudioOutput {
    fn open(&self) -> Result<Box<dyn AudioSink>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(anyhow!("no audio device"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSink {
            closed: self.closed.clone(),
            samples: self.samples.clone(),
            is_closed: false,
        }))
    }
}

impl AudioSink for RecordingSink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.samples.fetch_add(samples.len(), Ordering::SeqCst);
        // Stand in for device back-pressure so the loop does not spin
        std::thread::sleep(std::time::Duration::from_millis(1));
        Ok(())
    }

    fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct RecordingVibrator {
    started: AtomicUsize,
    cancelled: AtomicUsize,
    pattern: Mutex<Option<VibrationPattern>>,
}

impl RecordingVibrator {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_pattern(&self) -> Option<VibrationPattern> {
        lock(&self.pattern).clone()
    }
}

impl Vibrator for RecordingVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) {
        self.started.fetch_add(1, Ordering::SeqCst);
        *lock(&self.pattern) = Some(pattern.clone());
    }

    fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    shown: Mutex<Vec<AlertView>>,
    visible: Mutex<HashSet<Uuid>>,
    cleared: AtomicUsize,
}

impl RecordingSurface {
    pub fn shown_titles(&self) -> Vec<String> {
        lock(&self.shown).iter().map(|v| v.title.clone()).collect()
    }

    pub fn last_shown(&self) -> Option<AlertView> {
        lock(&self.shown).last().cloned()
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Alerts shown and not yet cleared
    pub fn visible_count(&self) -> usize {
        lock(&self.visible).len()
    }
}

impl AlertSurface for RecordingSurface {
    fn show(&self, view: &AlertView) {
        lock(&self.shown).push(view.clone());
        lock(&self.visible).insert(view.session_id);
    }

    fn clear(&self, session_id: Uuid) {
        lock(&self.visible).remove(&session_id);
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}
