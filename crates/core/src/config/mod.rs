use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, TuneGuideError};

/// Top-level configuration structure for the application.
///
/// Every section falls back to its defaults when absent, so a JSON file only
/// needs to name the values it wants to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub pitch: PitchConfig,
    pub tracker: TrackerConfig,
    pub analysis: AnalysisConfig,
    pub synth: SynthConfig,
    pub cadence: CadenceConfig,
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values that would make the engine divide by zero or spin.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(TuneGuideError::InvalidInput("sample_rate must be positive"));
        }
        if self.audio.block_size == 0 {
            return Err(TuneGuideError::InvalidInput("block_size must be positive"));
        }
        if self.audio.analysis_window < 8 {
            return Err(TuneGuideError::InvalidInput(
                "analysis_window must hold at least eight samples",
            ));
        }
        if !(self.pitch.threshold > 0.0 && self.pitch.threshold < 1.0) {
            return Err(TuneGuideError::InvalidInput(
                "pitch threshold must lie in (0, 1)",
            ));
        }
        if self.tracker.lookahead_seconds < 0.0 || !self.tracker.lookahead_seconds.is_finite() {
            return Err(TuneGuideError::InvalidInput(
                "lookahead_seconds must be a non-negative number",
            ));
        }
        if self.analysis.perfect_threshold_cents <= 0.0 {
            return Err(TuneGuideError::InvalidInput(
                "perfect_threshold_cents must be positive",
            ));
        }
        let intervals = [
            self.cadence.frame_interval_ms,
            self.cadence.tracker_interval_ms,
            self.cadence.ui_interval_ms,
        ];
        if intervals.iter().any(|ms| !(*ms > 0.0) || !ms.is_finite()) {
            return Err(TuneGuideError::InvalidInput(
                "cadence intervals must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Length of the microphone frames handed to the pitch estimator. Must
    /// cover two periods of the lowest expected vocal pitch (~80 Hz).
    pub analysis_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            analysis_window: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Absolute threshold on the cumulative-mean-normalised difference.
    pub threshold: f32,
    /// Frames quieter than this RMS are reported as "no pitch" outright.
    pub min_rms: f32,
    /// Search only around the active target when one exists.
    pub anchored_search: bool,
    /// Half-width of the anchored lag window, relative to the target lag.
    pub anchor_tolerance: f32,
    /// Minimum normalised autocorrelation accepted by the anchored search.
    pub min_clarity: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.12,
            min_rms: 0.005,
            anchored_search: true,
            anchor_tolerance: 0.10,
            min_clarity: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Score-time margin by which the target switches ahead of a note onset.
    pub lookahead_seconds: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            lookahead_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples whose absolute deviation is below this count as "perfect".
    pub perfect_threshold_cents: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            perfect_threshold_cents: 15.0,
        }
    }
}

/// Tone model and mixing parameters for the reference playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub attack_seconds: f64,
    /// Time from onset at which the decay reaches the sustain level.
    pub decay_seconds: f64,
    pub peak_level: f32,
    pub sustain_level: f32,
    pub release_seconds: f64,
    /// Level the exponential segments start from and fall towards.
    pub floor_level: f32,
    pub partial_level: f32,
    pub partial_decay_seconds: f64,
    pub lowpass_base_hz: f32,
    pub lowpass_per_hz: f32,
    pub lowpass_max_hz: f32,
    pub lowpass_q: f32,
    pub highpass_hz: f32,
    pub highpass_q: f32,
    pub master_gain: f32,
    /// Events whose onset is at most this far in the past are still scheduled.
    pub resume_slack_seconds: f64,
    pub solo_main_gain: f32,
    pub solo_other_gain: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            attack_seconds: 0.008,
            decay_seconds: 0.10,
            peak_level: 0.85,
            sustain_level: 0.22,
            release_seconds: 0.12,
            floor_level: 0.0001,
            partial_level: 0.12,
            partial_decay_seconds: 0.08,
            lowpass_base_hz: 1800.0,
            lowpass_per_hz: 1.4,
            lowpass_max_hz: 4200.0,
            lowpass_q: 0.6,
            highpass_hz: 40.0,
            highpass_q: 0.7,
            master_gain: 0.8,
            resume_slack_seconds: 0.05,
            solo_main_gain: 1.0,
            solo_other_gain: 0.15,
        }
    }
}

impl SynthConfig {
    /// Low-pass cutoff that follows the fundamental across the vocal range.
    pub fn lowpass_cutoff(&self, frequency_hz: f32) -> f32 {
        (self.lowpass_base_hz + frequency_hz * self.lowpass_per_hz).min(self.lowpass_max_hz)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub frame_interval_ms: f64,
    pub tracker_interval_ms: f64,
    pub ui_interval_ms: f64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000.0 / 60.0,
            tracker_interval_ms: 120.0,
            ui_interval_ms: 75.0,
        }
    }
}
