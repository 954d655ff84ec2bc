//! Monophonic pitch estimation and the pitch/cents arithmetic shared by the
//! rest of the engine.

mod autocorr;
pub mod yin;

use serde::{Deserialize, Serialize};

pub use autocorr::Autocorrelator;

use crate::config::PitchConfig;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2f32.powf((midi - 69.0) / 12.0)
}

/// Fractional MIDI number of a frequency.
pub fn hz_to_midi(frequency_hz: f32) -> f32 {
    69.0 + 12.0 * (frequency_hz / 440.0).log2()
}

pub fn nearest_midi(frequency_hz: f32) -> Option<u8> {
    if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
        return None;
    }
    let midi = hz_to_midi(frequency_hz).round();
    (0.0..=127.0).contains(&midi).then_some(midi as u8)
}

/// `1200·log2(frequency / reference)`.
pub fn cents_between(frequency_hz: f32, reference_hz: f32) -> f32 {
    1200.0 * (frequency_hz / reference_hz).log2()
}

pub fn note_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[midi as usize % 12], octave)
}

/// A detected pitch, snapped to the nearest semitone for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchReading {
    pub frequency_hz: f32,
    pub midi: u8,
    /// Distance from `midi` in cents.
    pub cents_off: f32,
}

impl PitchReading {
    pub fn from_frequency(frequency_hz: f32) -> Option<Self> {
        let midi = nearest_midi(frequency_hz)?;
        Some(Self {
            frequency_hz,
            midi,
            cents_off: cents_between(frequency_hz, midi_to_hz(midi as f32)),
        })
    }
}

/// Estimates the fundamental of fixed-length frames.
///
/// The output depends only on the frame, the sample rate and the optional
/// anchor; the buffers kept here are scratch space.
#[derive(Debug)]
pub struct PitchEstimator {
    config: PitchConfig,
    sample_rate: u32,
    yin_scratch: Vec<f32>,
    correlation: Vec<f32>,
    autocorrelator: Autocorrelator,
}

impl PitchEstimator {
    pub fn new(config: PitchConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            yin_scratch: Vec::new(),
            correlation: Vec::new(),
            autocorrelator: Autocorrelator::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lowest frequency a frame of `len` samples can resolve.
    pub fn min_frequency(&self, len: usize) -> f32 {
        self.sample_rate as f32 / (len / 2).max(1) as f32
    }

    /// Full-range estimate; `None` means "no pitch".
    pub fn estimate(&mut self, frame: &[f32]) -> Option<f32> {
        if !self.is_loud_enough(frame) {
            return None;
        }
        yin::estimate(
            frame,
            self.sample_rate,
            self.config.threshold,
            &mut self.yin_scratch,
        )
    }

    /// Estimate biased towards `target_hz`, the pitch the singer should be on.
    ///
    /// Only lags within the configured tolerance of the target lag are
    /// searched. When no target is given, or when the window holds no clear
    /// interior peak (the singer is far from the target), the full-range
    /// search runs instead.
    pub fn estimate_near(&mut self, frame: &[f32], target_hz: Option<f32>) -> Option<f32> {
        if !self.config.anchored_search {
            return self.estimate(frame);
        }
        let Some(target_hz) = target_hz.filter(|hz| hz.is_finite() && *hz > 0.0) else {
            return self.estimate(frame);
        };
        if !self.is_loud_enough(frame) {
            return None;
        }

        match self.anchored(frame, target_hz) {
            Some(frequency) => Some(frequency),
            None => yin::estimate(
                frame,
                self.sample_rate,
                self.config.threshold,
                &mut self.yin_scratch,
            ),
        }
    }

    fn anchored(&mut self, frame: &[f32], target_hz: f32) -> Option<f32> {
        let half = frame.len() / 2;
        let center = self.sample_rate as f32 / target_hz;
        let tolerance = self.config.anchor_tolerance.clamp(0.01, 0.5);
        let lo = ((center * (1.0 - tolerance)).floor() as usize).max(1);
        let hi = ((center * (1.0 + tolerance)).ceil() as usize).min(half.saturating_sub(1));
        if lo + 2 > hi {
            return None;
        }

        if let Err(err) = self
            .autocorrelator
            .compute(frame, &mut self.correlation)
        {
            tracing::debug!(%err, "autocorrelation failed, using full search");
            return None;
        }
        let energy = self.correlation[0];
        if energy <= f32::EPSILON {
            return None;
        }

        // Unbiased per-lag normalisation, so the shrinking overlap does not
        // pull the peak towards shorter lags.
        let len = frame.len() as f32;
        let normalized = |lag: usize, r: &[f32]| r[lag] * len / (len - lag as f32) / energy;

        let best = (lo..=hi).max_by(|a, b| {
            normalized(*a, &self.correlation).total_cmp(&normalized(*b, &self.correlation))
        })?;
        if best == lo || best == hi {
            return None;
        }
        let clarity = normalized(best, &self.correlation);
        if clarity < self.config.min_clarity {
            return None;
        }
        // A strong peak at a fraction of the lag means the window caught a
        // multiple of a shorter period, i.e. the voice is an octave or more
        // above the target.
        for divisor in 2..=3 {
            let lag = (best as f32 / divisor as f32).round() as usize;
            if lag >= 1 && normalized(lag, &self.correlation) >= self.config.min_clarity {
                return None;
            }
        }

        let (y0, y1, y2) = (
            normalized(best - 1, &self.correlation),
            clarity,
            normalized(best + 1, &self.correlation),
        );
        let curvature = y0 - 2.0 * y1 + y2;
        let refined = if curvature.abs() > f32::EPSILON {
            best as f32 + (y0 - y2) / (2.0 * curvature)
        } else {
            best as f32
        };
        Some(self.sample_rate as f32 / refined)
    }

    fn is_loud_enough(&self, frame: &[f32]) -> bool {
        !frame.is_empty() && compute_rms(frame) >= self.config.min_rms
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    const SAMPLE_RATE: u32 = 44_100;
    const WINDOW: usize = 2048;

    fn sine(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin() * 0.6)
            .collect()
    }

    fn noise(len: usize) -> Vec<f32> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 40) as f32 / (1u64 << 24) as f32 - 0.5
            })
            .collect()
    }

    fn estimator() -> PitchEstimator {
        PitchEstimator::new(PitchConfig::default(), SAMPLE_RATE)
    }

    #[test]
    fn pure_tones_within_one_percent() {
        let mut estimator = estimator();
        for frequency in [80.0, 98.0, 146.8, 220.0, 330.0, 440.0, 659.3, 880.0, 1000.0] {
            let detected = estimator
                .estimate(&sine(frequency, WINDOW))
                .unwrap_or_else(|| panic!("no pitch for {frequency} Hz"));
            let error = (detected - frequency).abs() / frequency;
            assert!(error < 0.01, "{frequency} Hz detected as {detected} Hz");
        }
    }

    #[test]
    fn white_noise_has_no_pitch() {
        let mut estimator = estimator();
        assert_eq!(estimator.estimate(&noise(WINDOW)), None);
        assert_eq!(estimator.estimate_near(&noise(WINDOW), Some(220.0)), None);
    }

    #[test]
    fn silence_is_gated() {
        let mut estimator = estimator();
        assert_eq!(estimator.estimate(&vec![0.0; WINDOW]), None);
    }

    #[test]
    fn anchored_search_agrees_with_full_search_near_target() {
        let mut estimator = estimator();
        let frame = sine(233.0, WINDOW);
        let anchored = estimator.estimate_near(&frame, Some(220.0)).unwrap();
        assert!((anchored - 233.0).abs() / 233.0 < 0.01, "got {anchored}");
    }

    #[test]
    fn anchored_search_falls_back_far_from_target() {
        let mut estimator = estimator();
        let frame = sine(440.0, WINDOW);
        let detected = estimator.estimate_near(&frame, Some(220.0)).unwrap();
        assert!((detected - 440.0).abs() / 440.0 < 0.01, "got {detected}");

        let detected = estimator.estimate_near(&frame, None).unwrap();
        assert!((detected - 440.0).abs() / 440.0 < 0.01);
    }

    #[test]
    fn minimum_frequency_follows_window() {
        let estimator = estimator();
        assert!(estimator.min_frequency(WINDOW) < 80.0 / 2.0 + 5.0);
    }

    #[test]
    fn pitch_arithmetic() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert!((hz_to_midi(261.63) - 60.0).abs() < 0.01);
        assert_eq!(nearest_midi(445.0), Some(69));
        assert_eq!(nearest_midi(0.0), None);
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-3);
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(70), "A#4");

        let reading = PitchReading::from_frequency(452.0).unwrap();
        assert_eq!(reading.midi, 69);
        assert!(reading.cents_off > 40.0 && reading.cents_off < 50.0);
    }
}
