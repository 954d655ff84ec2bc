use serde::{Deserialize, Serialize};

use crate::{audio::CaptureDevice, Result};

/// Options for the buffering recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub sample_rate: u32,
    /// Upper bound on the take length; frames beyond it are dropped.
    pub max_seconds: f64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_seconds: 15.0 * 60.0,
        }
    }
}

/// Audio captured during a session, handed to the reporting side as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedTake {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl RecordedTake {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Capture device that keeps every block it receives.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    samples: Vec<f32>,
    is_recording: bool,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            samples: Vec::new(),
            is_recording: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn capacity(&self) -> usize {
        (self.settings.max_seconds.max(0.0) * self.settings.sample_rate as f64) as usize
    }
}

impl CaptureDevice for Recorder {
    fn start(&mut self) -> Result<()> {
        if !self.is_recording {
            self.samples.clear();
            self.is_recording = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<Option<RecordedTake>> {
        if !self.is_recording {
            return Ok(None);
        }
        self.is_recording = false;
        let take = RecordedTake {
            sample_rate: self.settings.sample_rate,
            samples: std::mem::take(&mut self.samples),
        };
        tracing::debug!(seconds = take.duration_seconds(), "recording finished");
        Ok(Some(take))
    }

    fn on_block(&mut self, block: &[f32]) {
        if !self.is_recording {
            return;
        }
        let room = self.capacity().saturating_sub(self.samples.len());
        self.samples.extend_from_slice(&block[..block.len().min(room)]);
    }
}
