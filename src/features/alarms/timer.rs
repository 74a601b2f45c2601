//! # Timer Facility
//!
//! The wall-clock timer capability the scheduler arms alarms through, plus a
//! tokio-backed host implementation.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.2.0: Wake-ups follow the wall clock across suspend and clock steps
//! - 1.1.0: Inexact timers fire within a bounded window after their instant
//! - 1.0.0: Initial release

use crate::core::clock::Clock;
use crate::core::error::TimerError;
use crate::core::models::ReminderSource;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Longest single sleep before the wall clock is read again
pub const WAKE_SLICE: Duration = Duration::from_secs(30);

/// Namespace for deriving timer tokens from reminder ids
const TOKEN_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_2a61_93d4_4b8e_a1f7_0e6b_3c2d_9a41);

/// Identifies one timer slot. Derived from the reminder id alone, so
/// re-arming a reminder always targets the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerToken(Uuid);

impl TimerToken {
    pub fn for_reminder(reminder_id: &str) -> Self {
        TimerToken(Uuid::new_v5(&TOKEN_NAMESPACE, reminder_id.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a timer must fire at its instant or may be deferred by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerMode {
    Exact,
    Inexact,
}

/// One timer that should exist. Recomputed on every pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub token: TimerToken,
    pub fire_at: DateTime<Utc>,
    pub reminder_id: String,
    pub recurring: bool,
    pub source: ReminderSource,
    pub title: String,
    pub description: String,
}

/// Delivered to the dispatcher when a timer goes off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredAlarm {
    pub entry: ScheduleEntry,
    pub fired_at: DateTime<Utc>,
}

/// Platform wall-clock timers.
///
/// Calls are expected to be fast and non-blocking. Failures are returned as
/// values; a facility must never panic on a refused registration.
pub trait TimerFacility: Send + Sync {
    /// Arm a one-shot timer for `entry.fire_at` under `entry.token`,
    /// replacing any timer already holding that token
    fn register(&self, entry: &ScheduleEntry, mode: TimerMode) -> Result<(), TimerError>;

    /// Disarm the timer holding `token`. No-op if none is armed.
    fn cancel(&self, token: TimerToken);

    fn can_schedule_exact(&self) -> bool;

    /// Ask the platform for exact scheduling. Returns the permission state afterwards.
    fn request_exact_permission(&self) -> bool;
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Host timer facility running one tokio task per armed token
pub struct TokioTimerFacility {
    timers: Arc<DashMap<TimerToken, ArmedTimer>>,
    generation: AtomicU64,
    fired_tx: mpsc::UnboundedSender<FiredAlarm>,
    exact_permitted: AtomicBool,
    inexact_window: Duration,
    clock: Arc<dyn Clock>,
    runtime: tokio::runtime::Handle,
}

impl TokioTimerFacility {
    /// Create a facility bound to the current tokio runtime.
    ///
    /// Fired alarms arrive on the returned receiver.
    pub fn new(
        clock: Arc<dyn Clock>,
        exact_permitted: bool,
        inexact_window: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FiredAlarm>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let facility = TokioTimerFacility {
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            fired_tx,
            exact_permitted: AtomicBool::new(exact_permitted),
            inexact_window,
            clock,
            runtime: tokio::runtime::Handle::current(),
        };
        (facility, fired_rx)
    }

    /// Grant or revoke exact scheduling (the platform settings toggle)
    pub fn set_exact_permitted(&self, permitted: bool) {
        self.exact_permitted.store(permitted, Ordering::SeqCst);
        info!("Exact alarm permission set to {permitted}");
    }

    /// Number of timers currently armed
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.timers.contains_key(&token)
    }

    /// Deferral applied to an inexact timer, spread deterministically per token
    fn inexact_delay(&self, token: TimerToken) -> Duration {
        let window_ms = self.inexact_window.as_millis();
        if window_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis((token.as_uuid().as_u128() % window_ms) as u64)
    }
}

impl TimerFacility for TokioTimerFacility {
    fn register(&self, entry: &ScheduleEntry, mode: TimerMode) -> Result<(), TimerError> {
        if mode == TimerMode::Exact && !self.exact_permitted.load(Ordering::SeqCst) {
            return Err(TimerError::PermissionDenied);
        }
        if self.fired_tx.is_closed() {
            return Err(TimerError::Failed("alarm dispatcher has stopped".to_string()));
        }

        let due_at = match mode {
            TimerMode::Exact => entry.fire_at,
            TimerMode::Inexact => {
                let deferral = self.inexact_delay(entry.token).as_millis() as i64;
                entry.fire_at + chrono::Duration::milliseconds(deferral)
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let timers = self.timers.clone();
        let fired_tx = self.fired_tx.clone();
        let clock = self.clock.clone();
        let fired_entry = entry.clone();

        let task = async move {
            sleep_until_wall(clock.as_ref(), due_at).await;
            let token = fired_entry.token;
            timers.remove_if(&token, |_, armed| armed.generation == generation);
            debug!("Timer {} fired for reminder {}", token, fired_entry.reminder_id);
            let fired = FiredAlarm {
                entry: fired_entry,
                fired_at: clock.now(),
            };
            if fired_tx.send(fired).is_err() {
                warn!("Timer {token} fired but the dispatcher is gone");
            }
        };

        // Spawn while holding the slot so a zero-delay timer cannot fire
        // (and clear its slot) before it has been recorded
        match self.timers.entry(entry.token) {
            Entry::Occupied(mut slot) => {
                let handle = self.runtime.spawn(task);
                let previous = slot.insert(ArmedTimer { generation, handle });
                previous.handle.abort();
            }
            Entry::Vacant(slot) => {
                let handle = self.runtime.spawn(task);
                slot.insert(ArmedTimer { generation, handle });
            }
        }

        debug!(
            "Armed {:?} timer {} for {} at {}",
            mode, entry.token, entry.reminder_id, due_at
        );
        Ok(())
    }

    fn cancel(&self, token: TimerToken) {
        if let Some((_, armed)) = self.timers.remove(&token) {
            armed.handle.abort();
            debug!("Cancelled timer {token}");
        }
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted.load(Ordering::SeqCst)
    }

    fn request_exact_permission(&self) -> bool {
        let permitted = self.can_schedule_exact();
        if !permitted {
            warn!(
                "Exact alarms are not permitted; enable them in the host settings \
                 (EXACT_ALARMS_PERMITTED) or alarms may be delayed"
            );
        }
        permitted
    }
}

/// Sleep until the wall clock reaches `due_at`.
///
/// Tokio sleeps on the monotonic clock, which stalls while the host is
/// suspended and ignores wall-clock steps. The wait is sliced and the wall
/// clock re-read after every slice.
async fn sleep_until_wall(clock: &dyn Clock, due_at: DateTime<Utc>) {
    loop {
        let Ok(remaining) = (due_at - clock.now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(WAKE_SLICE)).await;
    }
}

impl Drop for TokioTimerFacility {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
    }
}
