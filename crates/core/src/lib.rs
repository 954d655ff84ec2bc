//! Core library of the TuneGuide vocal trainer.
//!
//! The engine plays a reference melody from a parsed score, listens to the
//! singer, estimates the sung pitch and compares it with the note the singer
//! should currently be on. Each module owns one subsystem; the
//! [`SessionController`] wires them together.

pub mod analysis;
pub mod audio;
pub mod cadence;
pub mod config;
pub mod error;
pub mod pitch;
pub mod playback;
pub mod record;
pub mod score;
pub mod session;
pub mod synth;
pub mod timeline;
pub mod tracker;

pub use analysis::{AnalyzerReport, DeviationAnalyzer, DeviationSample, PerformanceTier};
pub use audio::{CaptureDevice, EngineClock, NullOutput, OutputDevice};
pub use cadence::{Cadence, CadenceScheduler, TaskTicket};
pub use config::{
    AnalysisConfig, AppConfig, AudioConfig, CadenceConfig, PitchConfig, SynthConfig,
    TrackerConfig,
};
pub use error::{Result, TuneGuideError};
pub use pitch::{PitchEstimator, PitchReading};
pub use playback::{EventKey, PlaybackScheduler, ToneHandle, VoiceBus};
pub use record::{RecordedTake, Recorder, RecordingSettings};
pub use score::{Score, ScoreNote, ScorePart, ScorePitch};
pub use session::{SessionContext, SessionController, SessionReport, TransportState, UiSnapshot};
pub use timeline::{NoteEvent, NoteKind, PlaybackClock, Timeline, VoiceId};
pub use tracker::{TargetTracker, TrackerState};
