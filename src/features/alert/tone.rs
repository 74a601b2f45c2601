//! Synthesized alert tone and matching vibration rhythm.
//!
//! One cycle is a low kick-drum style hit (70 Hz sine under a fast
//! exponential decay) followed by 900 ms of silence. The vibration pattern
//! pulses on the same beat.

use anyhow::Result;
use std::f64::consts::PI;
use std::path::Path;

pub const SAMPLE_RATE: u32 = 44_100;

/// Tone frequency in Hz
pub const HIT_FREQUENCY: f64 = 70.0;

/// Length of the tone burst
pub const HIT_DURATION_MS: u32 = 220;

/// Envelope decay rate (1/s); the burst is below 10% amplitude after ~200 ms
pub const HIT_DECAY_RATE: f64 = 12.0;

/// Peak amplitude as a fraction of full scale
pub const HIT_GAIN: f64 = 0.8;

/// Silence between bursts
pub const PAUSE_DURATION_MS: u32 = 900;

/// Vibration on/off timings in milliseconds: start delay, pulse, pause
pub const VIBRATION_TIMINGS_MS: [u64; 3] = [0, 150, 950];

/// A vibration waveform, optionally repeating from `repeat_from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibrationPattern {
    /// Alternating off/on durations, starting with an off period
    pub timings_ms: Vec<u64>,
    pub repeat_from: Option<usize>,
}

impl VibrationPattern {
    /// The looping alert rhythm
    pub fn alert() -> Self {
        VibrationPattern {
            timings_ms: VIBRATION_TIMINGS_MS.to_vec(),
            repeat_from: Some(0),
        }
    }

    /// Length of one pass through the pattern
    pub fn period_ms(&self) -> u64 {
        self.timings_ms.iter().sum()
    }
}

fn samples_for(duration_ms: u32) -> usize {
    (SAMPLE_RATE as usize * duration_ms as usize) / 1000
}

/// One tone burst as 16-bit PCM
pub fn drum_hit() -> Vec<i16> {
    let step = 2.0 * PI * HIT_FREQUENCY / SAMPLE_RATE as f64;
    (0..samples_for(HIT_DURATION_MS))
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let envelope = (-t * HIT_DECAY_RATE).exp();
            let value = (step * i as f64).sin() * envelope * i16::MAX as f64 * HIT_GAIN;
            value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

pub fn silence(duration_ms: u32) -> Vec<i16> {
    vec![0; samples_for(duration_ms)]
}

/// One full alert cycle: burst then pause
pub fn alert_cycle() -> Vec<i16> {
    let mut cycle = drum_hit();
    cycle.extend(silence(PAUSE_DURATION_MS));
    cycle
}

/// Render `cycles` alert cycles to a mono 16-bit WAV file
pub fn write_alert_wav(path: &Path, cycles: usize) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let cycle = alert_cycle();
    for _ in 0..cycles {
        for &sample in &cycle {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}
