//! # Alert Session
//!
//! The user-facing side of a fired alarm: a persistent alert surface, the
//! looping synthesized tone and a matching vibration, all torn down by a
//! single dismiss.
//!
//! Audio runs on a dedicated thread because the sink write blocks for the
//! duration of the samples. The thread polls a shared stop flag between
//! 20 ms chunks and reports completion on a channel, so dismiss can wait for
//! it with a bounded timeout.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: AlertManager enforces a single sounding session
//! - 1.0.0: Initial release

use crate::core::error::AlarmError;
use crate::features::alert::output::{AlertSurface, AlertView, AudioOutput, AudioSink, Vibrator};
use crate::features::alert::tone::{alert_cycle, VibrationPattern, SAMPLE_RATE};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Samples per audio write
pub const CHUNK_SAMPLES: usize = SAMPLE_RATE as usize / 50;

/// Default bound on waiting for the audio thread during dismiss
pub const DEFAULT_DISMISS_TIMEOUT: Duration = Duration::from_millis(500);

pub const DISMISS_LABEL: &str = "Dismiss";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sounding,
    Dismissed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Sounding => write!(f, "sounding"),
            SessionState::Dismissed => write!(f, "dismissed"),
        }
    }
}

/// Devices an alert session renders to
#[derive(Clone)]
pub struct AlertOutputs {
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
    pub surface: Arc<dyn AlertSurface>,
    pub dismiss_timeout: Duration,
}

struct AudioWorker {
    handle: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

pub struct AlertSession {
    id: Uuid,
    title: String,
    description: String,
    state: SessionState,
    outputs: AlertOutputs,
    stop: Arc<AtomicBool>,
    /// True while no audio stream is held open
    audio_released: Arc<AtomicBool>,
    vibrating: bool,
    surface_shown: bool,
    worker: Option<AudioWorker>,
}

impl AlertSession {
    pub fn new(outputs: AlertOutputs, title: impl Into<String>, description: impl Into<String>) -> Self {
        AlertSession {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            state: SessionState::Idle,
            outputs,
            stop: Arc::new(AtomicBool::new(false)),
            audio_released: Arc::new(AtomicBool::new(true)),
            vibrating: false,
            surface_shown: false,
            worker: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Idle -> Sounding.
    ///
    /// A missing audio device does not stop the session: the surface and the
    /// vibration still run, since a silent alert beats a lost one.
    pub fn start(&mut self) -> Result<(), AlarmError> {
        if self.state != SessionState::Idle {
            return Err(AlarmError::SessionStart(format!(
                "session {} is already {}",
                self.id, self.state
            )));
        }

        self.outputs.surface.show(&AlertView {
            session_id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            action_label: DISMISS_LABEL.to_string(),
        });
        self.surface_shown = true;

        self.outputs.vibrator.vibrate(&VibrationPattern::alert());
        self.vibrating = true;

        match self.outputs.audio.open() {
            Ok(sink) => {
                if let Err(e) = self.spawn_audio(sink) {
                    warn!("Alert {} has no sound: {}", self.id, e);
                }
            }
            Err(e) => warn!("Alert {} has no sound: {}", self.id, e),
        }

        self.state = SessionState::Sounding;
        info!("Alert session {} sounding: {}", self.id, self.title);
        Ok(())
    }

    fn spawn_audio(&mut self, mut sink: Box<dyn AudioSink>) -> std::io::Result<()> {
        let (done_tx, done_rx) = mpsc::channel();
        let stop = self.stop.clone();
        let released = self.audio_released.clone();
        released.store(false, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("alert-audio-{}", self.id.simple()))
            .spawn(move || {
                let cycle = alert_cycle();
                'looping: while !stop.load(Ordering::SeqCst) {
                    for chunk in cycle.chunks(CHUNK_SAMPLES) {
                        if stop.load(Ordering::SeqCst) {
                            break 'looping;
                        }
                        if let Err(e) = sink.write(chunk) {
                            warn!("Alert audio stopped: {e}");
                            break 'looping;
                        }
                    }
                }
                sink.close();
                released.store(true, Ordering::SeqCst);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(AudioWorker { handle, done_rx });
                Ok(())
            }
            Err(e) => {
                // The closure (and the sink it owns) was dropped unrun
                self.audio_released.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stop audio and vibration and clear the surface. Safe to call any
    /// number of times from any thread holding the session.
    pub fn dismiss(&mut self) {
        match self.state {
            SessionState::Dismissed => return,
            SessionState::Idle => {
                self.state = SessionState::Dismissed;
                return;
            }
            SessionState::Sounding => {}
        }

        self.stop.store(true, Ordering::SeqCst);

        if self.vibrating {
            self.outputs.vibrator.cancel();
            self.vibrating = false;
        }

        if let Some(worker) = self.worker.take() {
            match worker.done_rx.recv_timeout(self.outputs.dismiss_timeout) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        warn!("Alert audio thread for {} panicked", self.id);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!(
                        "Alert audio for {} did not stop within {:?}, detaching",
                        self.id, self.outputs.dismiss_timeout
                    );
                }
            }
        }

        if self.surface_shown {
            self.outputs.surface.clear(self.id);
            self.surface_shown = false;
        }

        self.state = SessionState::Dismissed;
        info!("Alert session {} dismissed", self.id);
    }

    /// Whether every output this session opened has been let go
    pub fn is_released(&self) -> bool {
        self.audio_released.load(Ordering::SeqCst)
            && !self.vibrating
            && !self.surface_shown
            && self.worker.is_none()
    }
}

impl Drop for AlertSession {
    fn drop(&mut self) {
        self.dismiss();
    }
}

/// Snapshot of the sounding alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAlert {
    pub session_id: Uuid,
    pub title: String,
    pub description: String,
}

/// Owns at most one sounding [`AlertSession`]
pub struct AlertManager {
    outputs: AlertOutputs,
    active: Mutex<Option<AlertSession>>,
}

impl AlertManager {
    pub fn new(outputs: AlertOutputs) -> Self {
        AlertManager {
            outputs,
            active: Mutex::new(None),
        }
    }

    /// Start a session for a fired alarm, dismissing the sounding one first
    pub fn start(&self, title: &str, description: &str) -> Result<Uuid, AlarmError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(mut previous) = active.take() {
            if previous.state() == SessionState::Sounding {
                info!(
                    "Alert '{}' supersedes sounding alert '{}'",
                    title,
                    previous.title()
                );
            }
            previous.dismiss();
        }

        let mut session = AlertSession::new(self.outputs.clone(), title, description);
        session.start()?;
        let id = session.id();
        *active = Some(session);
        Ok(id)
    }

    /// Dismiss the sounding session. Returns false when there was none.
    pub fn dismiss_active(&self) -> bool {
        let session = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match session {
            Some(mut session) => {
                session.dismiss();
                true
            }
            None => {
                debug!("Dismiss requested with no active alert");
                false
            }
        }
    }

    pub fn active(&self) -> Option<ActiveAlert> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|s| s.state() == SessionState::Sounding)
            .map(|s| ActiveAlert {
                session_id: s.id(),
                title: s.title().to_string(),
                description: s.description().to_string(),
            })
    }
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        self.dismiss_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingAudioOutput, RecordingSurface, RecordingVibrator};
    use std::time::Instant;

    struct Rig {
        audio: Arc<RecordingAudioOutput>,
        vibrator: Arc<RecordingVibrator>,
        surface: Arc<RecordingSurface>,
        outputs: AlertOutputs,
    }

    fn rig() -> Rig {
        let audio = Arc::new(RecordingAudioOutput::default());
        let vibrator = Arc::new(RecordingVibrator::default());
        let surface = Arc::new(RecordingSurface::default());
        let outputs = AlertOutputs {
            audio: audio.clone(),
            vibrator: vibrator.clone(),
            surface: surface.clone(),
            dismiss_timeout: DEFAULT_DISMISS_TIMEOUT,
        };
        Rig {
            audio,
            vibrator,
            surface,
            outputs,
        }
    }

    #[test]
    fn test_start_then_dismiss() {
        let rig = rig();
        let mut session = AlertSession::new(rig.outputs.clone(), "Standup", "Room 4");
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Sounding);
        assert_eq!(rig.surface.shown_titles(), vec!["Standup".to_string()]);
        assert_eq!(rig.surface.last_shown().unwrap().action_label, DISMISS_LABEL);
        assert_eq!(rig.vibrator.last_pattern(), Some(VibrationPattern::alert()));
        assert!(!session.is_released());

        let started = Instant::now();
        session.dismiss();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(session.state(), SessionState::Dismissed);
        assert!(session.is_released());
        assert_eq!(rig.audio.opened(), 1);
        assert_eq!(rig.audio.closed(), 1);
        assert_eq!(rig.vibrator.cancelled(), 1);
        assert_eq!(rig.surface.visible_count(), 0);
    }

    #[test]
    fn test_audio_loops_until_dismissed() {
        let rig = rig();
        let mut session = AlertSession::new(rig.outputs.clone(), "Loop", "");
        session.start().unwrap();

        // Each recording write takes ~1 ms, so a full cycle (55 chunks) passes quickly
        thread::sleep(Duration::from_millis(200));
        session.dismiss();
        assert!(rig.audio.samples_written() > alert_cycle().len());
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let rig = rig();
        let mut session = AlertSession::new(rig.outputs.clone(), "Twice", "");
        session.start().unwrap();
        session.dismiss();
        session.dismiss();
        drop(session);

        assert_eq!(rig.vibrator.cancelled(), 1);
        assert_eq!(rig.surface.cleared_count(), 1);
        assert_eq!(rig.audio.closed(), 1);
    }

    #[test]
    fn test_drop_dismisses() {
        let rig = rig();
        {
            let mut session = AlertSession::new(rig.outputs.clone(), "Dropped", "");
            session.start().unwrap();
        }
        assert_eq!(rig.audio.closed(), 1);
        assert_eq!(rig.surface.visible_count(), 0);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let rig = rig();
        let mut session = AlertSession::new(rig.outputs.clone(), "Once", "");
        session.start().unwrap();
        assert!(matches!(session.start(), Err(AlarmError::SessionStart(_))));
        session.dismiss();
        assert!(matches!(session.start(), Err(AlarmError::SessionStart(_))));
    }

    #[test]
    fn test_missing_audio_device_still_alerts() {
        let rig = rig();
        rig.audio.refuse_open();
        let mut session = AlertSession::new(rig.outputs.clone(), "Silent", "");
        session.start().unwrap();

        assert_eq!(session.state(), SessionState::Sounding);
        assert_eq!(rig.vibrator.started(), 1);
        session.dismiss();
        assert!(session.is_released());
    }

    #[test]
    fn test_manager_supersedes_sounding_session() {
        let rig = rig();
        let manager = AlertManager::new(rig.outputs.clone());

        let first = manager.start("First", "").unwrap();
        let second = manager.start("Second", "").unwrap();
        assert_ne!(first, second);

        let active = manager.active().unwrap();
        assert_eq!(active.session_id, second);
        assert_eq!(active.title, "Second");
        assert_eq!(rig.audio.opened(), 2);
        assert_eq!(rig.audio.closed(), 1);
        assert_eq!(rig.surface.visible_count(), 1);

        assert!(manager.dismiss_active());
        assert!(!manager.dismiss_active());
        assert!(manager.active().is_none());
        assert_eq!(rig.audio.closed(), 2);
    }
}
