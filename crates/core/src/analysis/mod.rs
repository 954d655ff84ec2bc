use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pitch::{cents_between, midi_to_hz};

/// One detection tick compared against the note the singer should be on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationSample {
    pub cents: f32,
    /// Target note of the sample.
    pub midi: u8,
}

/// Final numbers of a session, handed to the reporting UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerReport {
    pub mean_abs_cents_deviation: f32,
    pub perfect_count: usize,
    pub total_count: usize,
    /// Lowest and highest sung note (rounded detection), i.e. the vocal range.
    pub lowest_midi: Option<u8>,
    pub highest_midi: Option<u8>,
    /// Target notes of the most and least accurate samples.
    pub best_midi: Option<u8>,
    pub worst_midi: Option<u8>,
    pub cents_history: Vec<f32>,
}

impl AnalyzerReport {
    /// Share of perfect samples in `[0, 1]`; zero for an empty session.
    pub fn perfect_ratio(&self) -> f32 {
        if self.total_count == 0 {
            0.0
        } else {
            self.perfect_count as f32 / self.total_count as f32
        }
    }

    pub fn tier(&self) -> PerformanceTier {
        PerformanceTier::from_ratio(self.perfect_ratio())
    }
}

/// Coarse grading of a session used for the report medal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Precise,
    Steady,
    Developing,
    Beginning,
}

impl PerformanceTier {
    pub fn from_ratio(ratio: f32) -> Self {
        match ratio * 100.0 {
            p if p >= 80.0 => Self::Precise,
            p if p >= 65.0 => Self::Steady,
            p if p >= 45.0 => Self::Developing,
            _ => Self::Beginning,
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Precise => "precise",
            Self::Steady => "steady",
            Self::Developing => "developing",
            Self::Beginning => "beginning",
        };
        f.write_str(label)
    }
}

/// Running statistics over the deviation samples of one session.
#[derive(Debug, Clone)]
pub struct DeviationAnalyzer {
    perfect_threshold_cents: f32,
    history: Vec<f32>,
    abs_sum: f64,
    perfect_count: usize,
    lowest_midi: Option<u8>,
    highest_midi: Option<u8>,
    best: Option<DeviationSample>,
    worst: Option<DeviationSample>,
}

impl DeviationAnalyzer {
    pub fn new(perfect_threshold_cents: f32) -> Self {
        Self {
            perfect_threshold_cents,
            history: Vec::new(),
            abs_sum: 0.0,
            perfect_count: 0,
            lowest_midi: None,
            highest_midi: None,
            best: None,
            worst: None,
        }
    }

    pub fn perfect_threshold_cents(&self) -> f32 {
        self.perfect_threshold_cents
    }

    pub fn total_count(&self) -> usize {
        self.history.len()
    }

    /// Records a detection against a target note. Non-positive or
    /// non-finite frequencies are ignored.
    pub fn record(&mut self, detected_hz: f32, target_midi: u8) -> Option<DeviationSample> {
        if !(detected_hz.is_finite() && detected_hz > 0.0) {
            return None;
        }
        let cents = cents_between(detected_hz, midi_to_hz(target_midi as f32));
        self.record_cents(cents, target_midi)
    }

    /// Records a deviation that has already been expressed in cents.
    pub fn record_cents(&mut self, cents: f32, target_midi: u8) -> Option<DeviationSample> {
        if !cents.is_finite() {
            return None;
        }
        let sample = DeviationSample {
            cents,
            midi: target_midi,
        };
        let magnitude = cents.abs();

        self.history.push(cents);
        self.abs_sum += magnitude as f64;
        if magnitude < self.perfect_threshold_cents {
            self.perfect_count += 1;
        }

        let sung = (target_midi as f32 + cents / 100.0).round().clamp(0.0, 127.0) as u8;
        self.lowest_midi = Some(self.lowest_midi.map_or(sung, |low| low.min(sung)));
        self.highest_midi = Some(self.highest_midi.map_or(sung, |high| high.max(sung)));

        if self.best.map_or(true, |best| magnitude < best.cents.abs()) {
            self.best = Some(sample);
        }
        if self.worst.map_or(true, |worst| magnitude > worst.cents.abs()) {
            self.worst = Some(sample);
        }

        Some(sample)
    }

    /// Snapshot of the statistics gathered so far.
    pub fn report(&self) -> AnalyzerReport {
        let total_count = self.history.len();
        let mean_abs_cents_deviation = if total_count == 0 {
            0.0
        } else {
            (self.abs_sum / total_count as f64) as f32
        };

        AnalyzerReport {
            mean_abs_cents_deviation,
            perfect_count: self.perfect_count,
            total_count,
            lowest_midi: self.lowest_midi,
            highest_midi: self.highest_midi,
            best_midi: self.best.map(|sample| sample.midi),
            worst_midi: self.worst.map(|sample| sample.midi),
            cents_history: self.history.clone(),
        }
    }

    /// Produces the final report and clears the accumulators.
    pub fn finish(&mut self) -> AnalyzerReport {
        let report = self.report();
        self.reset();
        report
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.abs_sum = 0.0;
        self.perfect_count = 0;
        self.lowest_midi = None;
        self.highest_midi = None;
        self.best = None;
        self.worst = None;
    }
}
