//! # Alert Feature
//!
//! Synthesized tone, output seams and the dismissible alert session.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: WAV preview of the alert tone
//! - 1.0.0: Initial release

pub mod output;
pub mod session;
pub mod tone;

pub use output::{
    AlertSurface, AlertView, AudioOutput, AudioSink, LogSurface, LogVibrator, PacedAudioOutput,
    SurfaceSet, Vibrator,
};
pub use session::{ActiveAlert, AlertManager, AlertOutputs, AlertSession, SessionState};
pub use tone::{write_alert_wav, VibrationPattern};
