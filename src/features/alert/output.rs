//! Output seams of an alert session: audio device, vibrator, alert surface.
//!
//! Hosts bind these to real devices; the implementations here log or pace
//! output without touching hardware.

use crate::features::alert::tone::{VibrationPattern, SAMPLE_RATE};
use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use uuid::Uuid;

/// What the alert surface renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertView {
    pub session_id: Uuid,
    pub title: String,
    pub description: String,
    /// Label of the single action, which dismisses the session
    pub action_label: String,
}

/// Opens audio streams. One stream per alert session.
pub trait AudioOutput: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSink>>;
}

/// A mono 16-bit PCM stream at [`SAMPLE_RATE`]
pub trait AudioSink: Send {
    /// Blocks until the samples have been accepted by the device
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Stop output and release the stream
    fn close(&mut self);
}

pub trait Vibrator: Send + Sync {
    fn vibrate(&self, pattern: &VibrationPattern);

    fn cancel(&self);
}

/// Persistent, user-visible alert with a single dismiss action
pub trait AlertSurface: Send + Sync {
    fn show(&self, view: &AlertView);

    fn clear(&self, session_id: Uuid);
}

/// Device stand-in that accepts samples at real-time rate
#[derive(Debug, Clone, Copy, Default)]
pub struct PacedAudioOutput;

struct PacedSink {
    written: u64,
}

impl AudioOutput for PacedAudioOutput {
    fn open(&self) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(PacedSink { written: 0 }))
    }
}

impl AudioSink for PacedSink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let micros = samples.len() as u64 * 1_000_000 / SAMPLE_RATE as u64;
        std::thread::sleep(Duration::from_micros(micros));
        self.written += samples.len() as u64;
        Ok(())
    }

    fn close(&mut self) {
        debug!("Audio stream closed after {} samples", self.written);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) {
        info!("Vibrating {:?} (repeat from {:?})", pattern.timings_ms, pattern.repeat_from);
    }

    fn cancel(&self) {
        info!("Vibration cancelled");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSurface;

impl AlertSurface for LogSurface {
    fn show(&self, view: &AlertView) {
        warn!(
            "⏰ {} | {} [{}] ({})",
            view.title, view.description, view.action_label, view.session_id
        );
    }

    fn clear(&self, session_id: Uuid) {
        info!("Alert {session_id} cleared");
    }
}

/// Fans one alert out to several surfaces
pub struct SurfaceSet {
    surfaces: Vec<std::sync::Arc<dyn AlertSurface>>,
}

impl SurfaceSet {
    pub fn new(surfaces: Vec<std::sync::Arc<dyn AlertSurface>>) -> Self {
        SurfaceSet { surfaces }
    }
}

impl AlertSurface for SurfaceSet {
    fn show(&self, view: &AlertView) {
        for surface in &self.surfaces {
            surface.show(view);
        }
    }

    fn clear(&self, session_id: Uuid) {
        for surface in &self.surfaces {
            surface.clear(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurface;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_paced_sink_blocks_for_duration() {
        let mut sink = PacedAudioOutput.open().unwrap();
        let started = Instant::now();
        sink.write(&vec![0; SAMPLE_RATE as usize / 20]).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(45));
        sink.close();
    }

    #[test]
    fn test_surface_set_fans_out() {
        let a = Arc::new(RecordingSurface::default());
        let b = Arc::new(RecordingSurface::default());
        let set = SurfaceSet::new(vec![a.clone() as Arc<dyn AlertSurface>, b.clone()]);
        let view = AlertView {
            session_id: Uuid::new_v4(),
            title: "Standup".to_string(),
            description: String::new(),
            action_label: "Dismiss".to_string(),
        };

        set.show(&view);
        set.clear(view.session_id);

        assert_eq!(a.shown_titles(), vec!["Standup".to_string()]);
        assert_eq!(b.cleared_count(), 1);
        assert_eq!(a.visible_count(), 0);
    }
}
