use serde::{Deserialize, Serialize};

use crate::{pitch::PitchReading, timeline::NoteEvent};

/// Write capability for the playhead. Owned by the frame cadence.
#[derive(Debug)]
pub struct PlayheadWriter(());

/// Write capability for the current target. Owned by the tracker cadence.
#[derive(Debug)]
pub struct TargetWriter(());

/// Write capability for the last detection. Owned by the audio-frame path.
#[derive(Debug)]
pub struct DetectionWriter(());

/// Write capability for the UI snapshot. Owned by the UI cadence.
#[derive(Debug)]
pub struct UiWriter(());

/// The full set of writers; a session holds exactly one.
#[derive(Debug)]
pub(crate) struct ContextWriters {
    pub playhead: PlayheadWriter,
    pub target: TargetWriter,
    pub detection: DetectionWriter,
    pub ui: UiWriter,
}

impl ContextWriters {
    pub(crate) fn new() -> Self {
        Self {
            playhead: PlayheadWriter(()),
            target: TargetWriter(()),
            detection: DetectionWriter(()),
            ui: UiWriter(()),
        }
    }
}

/// What the display shows, refreshed at UI cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub target_midi: Option<u8>,
    /// Fractional MIDI of the last detection, for the singing line.
    pub detected_midi: Option<f32>,
    pub playhead_seconds: f64,
    /// `detected_midi - target_midi` when both are known.
    pub semitone_offset: Option<f32>,
}

impl UiSnapshot {
    pub fn new(playhead_seconds: f64, target_midi: Option<u8>, detected_midi: Option<f32>) -> Self {
        let semitone_offset = match (target_midi, detected_midi) {
            (Some(target), Some(detected)) => Some(detected - target as f32),
            _ => None,
        };
        Self {
            target_midi,
            detected_midi,
            playhead_seconds,
            semitone_offset,
        }
    }
}

/// State shared between the cadences of a session.
///
/// Every field has one writer, enforced by the writer token each setter
/// demands. Anyone holding a shared reference may read.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    playhead_seconds: f64,
    target: Option<NoteEvent>,
    detected: Option<PitchReading>,
    ui: UiSnapshot,
}

impl SessionContext {
    /// Score seconds under the playhead, as last published.
    pub fn playhead_seconds(&self) -> f64 {
        self.playhead_seconds
    }

    pub fn current_target(&self) -> Option<&NoteEvent> {
        self.target.as_ref()
    }

    /// MIDI note of the current target; `None` for rests and before the
    /// first resolution.
    pub fn target_midi(&self) -> Option<u8> {
        self.target.as_ref().and_then(NoteEvent::midi)
    }

    pub fn detected(&self) -> Option<PitchReading> {
        self.detected
    }

    pub fn detected_midi(&self) -> Option<u8> {
        self.detected.map(|reading| reading.midi)
    }

    pub fn ui(&self) -> &UiSnapshot {
        &self.ui
    }

    pub fn set_playhead(&mut self, _writer: &PlayheadWriter, seconds: f64) {
        self.playhead_seconds = seconds;
    }

    pub fn set_target(&mut self, _writer: &TargetWriter, target: Option<NoteEvent>) {
        self.target = target;
    }

    pub fn set_detected(&mut self, _writer: &DetectionWriter, detected: Option<PitchReading>) {
        self.detected = detected;
    }

    pub fn set_ui(&mut self, _writer: &UiWriter, snapshot: UiSnapshot) {
        self.ui = snapshot;
    }

    pub(crate) fn clear(&mut self, writers: &ContextWriters) {
        self.set_playhead(&writers.playhead, 0.0);
        self.set_target(&writers.target, None);
        self.set_detected(&writers.detection, None);
        self.set_ui(&writers.ui, UiSnapshot::default());
    }
}
