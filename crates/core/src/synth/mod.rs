//! Reference tone synthesis.
//!
//! Each note is an additive two-partial tone: a triangle fundamental plus a
//! sine one octave up that dies away within the first ~100 ms. The sum goes
//! through a low-pass filter whose cutoff follows the fundamental, then a
//! high-pass filter that removes rumble, then the amplitude envelope.

pub mod envelope;
pub mod filter;

use std::f64::consts::TAU;

pub use envelope::{Envelope, EnvelopeStage};
pub use filter::{FilterMode, SvfFilter};

use crate::config::SynthConfig;

/// A tone with absolute start and stop timestamps in engine seconds.
#[derive(Debug, Clone)]
pub struct Tone {
    frequency_hz: f64,
    envelope: Envelope,
    partial_level: f32,
    partial_floor: f32,
    partial_decay: f64,
    partial_stop: f64,
    lowpass: SvfFilter,
    highpass: SvfFilter,
}

impl Tone {
    pub fn new(
        frequency_hz: f32,
        onset: f64,
        offset: f64,
        config: &SynthConfig,
        sample_rate: u32,
    ) -> Self {
        let envelope = Envelope::new(onset, offset, config);
        let partial_stop = envelope.offset() + config.release_seconds.max(0.0) * 0.8;
        Self {
            frequency_hz: frequency_hz as f64,
            partial_level: config.partial_level.max(0.0),
            partial_floor: config.floor_level.max(1e-6),
            partial_decay: config.partial_decay_seconds.max(1e-3),
            partial_stop,
            lowpass: SvfFilter::new(
                FilterMode::LowPass,
                config.lowpass_cutoff(frequency_hz),
                config.lowpass_q,
                sample_rate,
            ),
            highpass: SvfFilter::new(
                FilterMode::HighPass,
                config.highpass_hz,
                config.highpass_q,
                sample_rate,
            ),
            envelope,
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz as f32
    }

    pub fn onset(&self) -> f64 {
        self.envelope.onset()
    }

    pub fn offset(&self) -> f64 {
        self.envelope.offset()
    }

    /// Engine time after which the tone is silent for good.
    pub fn end(&self) -> f64 {
        self.envelope.end()
    }

    pub fn is_finished(&self, time: f64) -> bool {
        time >= self.end()
    }

    /// Next output sample at engine time `time`.
    ///
    /// Filters keep state, so a tone must be rendered once per sample in
    /// increasing time order.
    pub fn next_sample(&mut self, time: f64) -> f32 {
        if time < self.envelope.onset() || time >= self.envelope.end() {
            return 0.0;
        }
        let elapsed = time - self.envelope.onset();

        let phase = (self.frequency_hz * elapsed).fract() as f32;
        let mut raw = triangle(phase);
        if time < self.partial_stop {
            let octave = (TAU * 2.0 * self.frequency_hz * elapsed).sin() as f32;
            raw += self.partial_gain(elapsed) * octave;
        }

        let shaped = self.highpass.process(self.lowpass.process(raw));
        shaped * self.envelope.level(time)
    }

    fn partial_gain(&self, elapsed: f64) -> f32 {
        if self.partial_level <= 0.0 || elapsed >= self.partial_decay {
            return 0.0;
        }
        let progress = (elapsed / self.partial_decay) as f32;
        envelope::exponential(self.partial_level, self.partial_floor, progress)
    }
}

/// Triangle wave starting at zero and rising, `phase` in `[0, 1)`.
fn triangle(phase: f32) -> f32 {
    1.0 - 4.0 * (((phase + 0.25) % 1.0) - 0.5).abs()
}
