//! Session orchestration: transport, cadences and the detection entry point.
//!
//! The controller owns the timeline and every subsystem. Hosts drive it from
//! two directions: the playback device pulls blocks through [`render`], which
//! also advances the cadences, and the capture side pushes audio in. Capture
//! arrives twice: each new block goes to [`on_captured_block`] for the
//! recording, and the overlapping analysis window goes to [`on_audio_frame`]
//! for detection.
//!
//! [`render`]: SessionController::render
//! [`on_captured_block`]: SessionController::on_captured_block
//! [`on_audio_frame`]: SessionController::on_audio_frame

mod context;

use serde::Serialize;

pub use context::{
    DetectionWriter, PlayheadWriter, SessionContext, TargetWriter, UiSnapshot, UiWriter,
};

use self::context::ContextWriters;
use crate::{
    analysis::{AnalyzerReport, DeviationAnalyzer, PerformanceTier},
    audio::{CaptureDevice, NullOutput, OutputDevice},
    cadence::{Cadence, CadenceScheduler, TaskTicket},
    config::AppConfig,
    pitch::{midi_to_hz, PitchEstimator, PitchReading},
    playback::PlaybackScheduler,
    record::{RecordedTake, Recorder, RecordingSettings},
    score::Score,
    timeline::{NoteEvent, Timeline, VoiceId},
    tracker::TargetTracker,
    Result, TuneGuideError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Everything the reporting side receives when a session ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub analysis: AnalyzerReport,
    #[serde(skip)]
    pub recording: Option<RecordedTake>,
}

impl SessionReport {
    pub fn tier(&self) -> PerformanceTier {
        self.analysis.tier()
    }
}

pub struct SessionController {
    config: AppConfig,
    timeline: Option<Timeline>,
    voice: Option<VoiceId>,
    solo: bool,
    transport: TransportState,
    scheduler: PlaybackScheduler,
    tracker: Option<TargetTracker>,
    analyzer: DeviationAnalyzer,
    estimator: PitchEstimator,
    cadences: CadenceScheduler,
    due: Vec<TaskTicket>,
    context: SessionContext,
    writers: ContextWriters,
    capture: Box<dyn CaptureDevice>,
    output: Box<dyn OutputDevice>,
}

impl SessionController {
    pub fn new(
        config: AppConfig,
        capture: Box<dyn CaptureDevice>,
        output: Box<dyn OutputDevice>,
    ) -> Result<Self> {
        config.validate()?;
        let sample_rate = config.audio.sample_rate;
        Ok(Self {
            scheduler: PlaybackScheduler::new(config.synth.clone(), sample_rate),
            analyzer: DeviationAnalyzer::new(config.analysis.perfect_threshold_cents),
            estimator: PitchEstimator::new(config.pitch.clone(), sample_rate),
            cadences: CadenceScheduler::new(&config.cadence),
            due: Vec::with_capacity(Cadence::ALL.len()),
            config,
            timeline: None,
            voice: None,
            solo: false,
            transport: TransportState::Stopped,
            tracker: None,
            context: SessionContext::default(),
            writers: ContextWriters::new(),
            capture,
            output,
        })
    }

    /// Session that records into memory and renders for a host that pulls
    /// blocks itself.
    pub fn offline(config: AppConfig) -> Result<Self> {
        let recorder = Recorder::new(RecordingSettings {
            sample_rate: config.audio.sample_rate,
            ..RecordingSettings::default()
        });
        Self::new(config, Box::new(recorder), Box::new(NullOutput::new()))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    pub fn selected_voice(&self) -> Option<VoiceId> {
        self.voice
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn tracker(&self) -> Option<&TargetTracker> {
        self.tracker.as_ref()
    }

    /// Replaces the timeline. A running session is stopped first and its
    /// report discarded. The selected voice survives if the new timeline
    /// has it; otherwise the first voice is selected.
    pub fn load_timeline(&mut self, score: &Score) -> Result<&Timeline> {
        let timeline = Timeline::build(score)?;
        if self.transport != TransportState::Stopped {
            self.stop()?;
        }

        self.scheduler.load(&timeline);
        self.solo = false;
        self.voice = self
            .voice
            .filter(|voice| timeline.contains_voice(*voice))
            .or_else(|| timeline.voice_ids().next());
        self.tracker = self.voice.and_then(|voice| {
            timeline
                .voice(voice)
                .map(|events| TargetTracker::new(voice, events))
        });
        self.context.clear(&self.writers);

        let floor_hz = self.detection_floor_hz();
        if let Some((low, _)) = timeline.pitch_range() {
            if midi_to_hz(low as f32) < floor_hz {
                tracing::warn!(
                    lowest_midi = low,
                    floor_hz,
                    "score goes below what the analysis window can detect"
                );
            }
        }
        tracing::info!(
            voices = timeline.voice_count(),
            seconds = timeline.duration_seconds(),
            skipped = timeline.skipped_notes(),
            "timeline loaded"
        );
        Ok(&*self.timeline.insert(timeline))
    }

    /// Chooses the voice the singer follows. While a session is under way
    /// the tracker jumps straight to the note under the playhead.
    pub fn select_voice(&mut self, voice: VoiceId) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(TuneGuideError::NoTimeline)?;
        let events = timeline
            .voice(voice)
            .ok_or(TuneGuideError::UnknownVoice(voice))?;

        let mut tracker = TargetTracker::new(voice, events);
        if self.transport != TransportState::Stopped {
            let first = tracker.resolve_first().cloned();
            let playhead = self.context.playhead_seconds();
            let target = tracker
                .catch_up(playhead, self.config.tracker.lookahead_seconds)
                .cloned()
                .or(first.filter(|event| event.start_sec <= playhead));
            self.context.set_target(&self.writers.target, target);
        }
        self.tracker = Some(tracker);
        self.voice = Some(voice);

        if self.solo {
            self.scheduler.set_solo(Some(voice), timeline);
        }
        tracing::info!(%voice, "voice selected");
        Ok(())
    }

    /// Starts a session from the top, or resumes a paused one.
    ///
    /// Device failures come back as [`TuneGuideError::DeviceUnavailable`]
    /// and leave the controller as it was, so the call can be retried.
    pub fn play(&mut self) -> Result<()> {
        if self.timeline.is_none() {
            return Err(TuneGuideError::NoTimeline);
        }
        match self.transport {
            TransportState::Playing => Ok(()),
            TransportState::Paused => {
                self.resume();
                Ok(())
            }
            TransportState::Stopped => {
                self.open_devices()?;
                self.begin();
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) {
        if self.transport != TransportState::Playing {
            return;
        }
        self.scheduler.pause();
        self.cadences.cancel_all();
        self.context
            .set_playhead(&self.writers.playhead, self.scheduler.playhead());
        self.transport = TransportState::Paused;
        tracing::info!(playhead = self.scheduler.playhead(), "paused");
    }

    /// Ends the session: silences playback, cancels every cadence, rewinds
    /// to the beginning and hands back the final report. `None` when no
    /// session was under way.
    pub fn stop(&mut self) -> Result<Option<SessionReport>> {
        if self.transport == TransportState::Stopped {
            return Ok(None);
        }
        self.scheduler.stop();
        self.cadences.cancel_all();
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.reset();
        }

        let recording = match self.capture.stop() {
            Ok(take) => take,
            Err(err) => {
                tracing::warn!(%err, "capture did not stop cleanly, dropping the take");
                None
            }
        };
        self.output.close();
        self.transport = TransportState::Stopped;
        self.context.clear(&self.writers);

        let analysis = self.analyzer.finish();
        tracing::info!(
            samples = analysis.total_count,
            mean_cents = analysis.mean_abs_cents_deviation,
            "session stopped"
        );
        Ok(Some(SessionReport {
            analysis,
            recording,
        }))
    }

    /// Throws the current session away and starts again from the top.
    pub fn restart(&mut self) -> Result<()> {
        if self.transport == TransportState::Stopped {
            return self.play();
        }
        self.scheduler.stop();
        self.cadences.cancel_all();

        // a fresh take for the fresh attempt
        if let Err(err) = self.capture.stop().and_then(|_| self.capture.start()) {
            tracing::warn!(%err, "capture failed to restart");
            self.output.close();
            self.transport = TransportState::Stopped;
            self.analyzer.reset();
            self.context.clear(&self.writers);
            return Err(device_error(err));
        }

        tracing::info!("restarting");
        self.begin();
        Ok(())
    }

    /// Changes the playback tempo; the playhead and the target cursor are
    /// kept. Returns the new tempo factor.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<f64> {
        let timeline = self.timeline.as_ref().ok_or(TuneGuideError::NoTimeline)?;
        let tempo_factor = self.scheduler.set_tempo(bpm, timeline)?;
        tracing::info!(bpm, tempo_factor, "tempo changed");
        Ok(tempo_factor)
    }

    pub fn set_solo(&mut self, enabled: bool, voice: VoiceId) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(TuneGuideError::NoTimeline)?;
        if !timeline.contains_voice(voice) {
            return Err(TuneGuideError::UnknownVoice(voice));
        }
        self.solo = enabled;
        self.scheduler.set_solo(enabled.then_some(voice), timeline);
        tracing::info!(enabled, %voice, "solo changed");
        Ok(())
    }

    pub fn set_voice_muted(&mut self, voice: VoiceId, muted: bool) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(TuneGuideError::NoTimeline)?;
        if !timeline.contains_voice(voice) {
            return Err(TuneGuideError::UnknownVoice(voice));
        }
        self.scheduler.set_voice_muted(voice, muted, timeline);
        Ok(())
    }

    /// Recording entry point, called with each block of newly captured
    /// samples. Blocks must not overlap; ignored unless a session is playing.
    pub fn on_captured_block(&mut self, block: &[f32]) {
        if self.transport == TransportState::Playing {
            self.capture.on_block(block);
        }
    }

    /// Detection entry point, called once per analysis window.
    ///
    /// Frames are ignored unless a session is playing. A detection is
    /// compared against the current target only when that target is a note.
    /// Frames never reach the recording.
    pub fn on_audio_frame(&mut self, frame: &[f32]) -> Option<PitchReading> {
        if self.transport != TransportState::Playing {
            return None;
        }

        let target_midi = self.context.target_midi();
        let target_hz = target_midi.map(|midi| midi_to_hz(midi as f32));
        let frequency = self.estimator.estimate_near(frame, target_hz);
        let reading = frequency.and_then(PitchReading::from_frequency);
        self.context.set_detected(&self.writers.detection, reading);

        if let (Some(frequency), Some(midi)) = (frequency, target_midi) {
            self.analyzer.record(frequency, midi);
        }
        reading
    }

    pub fn current_target(&self) -> Option<&NoteEvent> {
        self.context.current_target()
    }

    /// Report of the samples gathered so far; clears them.
    pub fn final_report(&mut self) -> AnalyzerReport {
        self.analyzer.finish()
    }

    /// Renders the next block of reference audio into `out`, then runs the
    /// cadences that came due.
    pub fn render(&mut self, out: &mut [f32]) {
        self.scheduler.render(out);
        if self.transport == TransportState::Playing {
            self.run_due_tasks();
        }
    }

    /// `true` once a playing session has passed the end of the timeline and
    /// the last tone has died away.
    pub fn is_finished(&self) -> bool {
        let Some(timeline) = self.timeline.as_ref() else {
            return false;
        };
        self.transport == TransportState::Playing
            && self.scheduler.playhead() >= timeline.duration_seconds()
            && self.scheduler.active_tones() == 0
    }

    fn open_devices(&mut self) -> Result<()> {
        let audio = &self.config.audio;
        if let Err(err) = self.output.open(audio.sample_rate, audio.block_size) {
            tracing::warn!(%err, "playback device unavailable");
            return Err(device_error(err));
        }
        if let Err(err) = self.capture.start() {
            tracing::warn!(%err, "capture device unavailable");
            self.output.close();
            return Err(device_error(err));
        }
        Ok(())
    }

    /// Starts playback from offset zero with fresh statistics.
    fn begin(&mut self) {
        let Some(timeline) = self.timeline.as_ref() else {
            return;
        };
        self.scheduler.stop();
        self.analyzer.reset();
        self.context.clear(&self.writers);

        let first = self.tracker.as_mut().and_then(|tracker| {
            tracker.reset();
            tracker.resolve_first().cloned()
        });
        self.context.set_target(&self.writers.target, first);

        let tones = self.scheduler.start(timeline);
        self.cadences.start(self.scheduler.now());
        self.transport = TransportState::Playing;
        tracing::info!(voice = ?self.voice, tones, "session started");
    }

    fn resume(&mut self) {
        let Some(timeline) = self.timeline.as_ref() else {
            return;
        };
        self.scheduler.start(timeline);
        self.cadences.start(self.scheduler.now());
        self.transport = TransportState::Playing;
        tracing::info!(playhead = self.scheduler.playhead(), "resumed");
    }

    /// Lowest pitch a full analysis window can resolve.
    fn detection_floor_hz(&self) -> f32 {
        self.estimator.min_frequency(self.config.audio.analysis_window)
    }

    fn run_due_tasks(&mut self) {
        let mut due = std::mem::take(&mut self.due);
        self.cadences.poll(self.scheduler.now(), &mut due);
        for ticket in &due {
            if !self.cadences.is_current(ticket) {
                continue;
            }
            match ticket.cadence {
                Cadence::Frame => {
                    self.context
                        .set_playhead(&self.writers.playhead, self.scheduler.playhead());
                }
                Cadence::Tracker => self.track_target(),
                Cadence::Ui => {
                    let snapshot = UiSnapshot::new(
                        self.context.playhead_seconds(),
                        self.context.target_midi(),
                        self.context.detected().map(|reading| {
                            reading.midi as f32 + reading.cents_off / 100.0
                        }),
                    );
                    self.context.set_ui(&self.writers.ui, snapshot);
                }
            }
        }
        self.due = due;
    }

    fn track_target(&mut self) {
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        let playhead = self.context.playhead_seconds();
        let Some(event) = tracker.tick(playhead, self.config.tracker.lookahead_seconds) else {
            return;
        };
        if self.context.current_target() != Some(event) {
            tracing::debug!(
                target_note = %event.label(),
                start = event.start_sec,
                "target changed"
            );
            self.context.set_target(&self.writers.target, Some(event.clone()));
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("transport", &self.transport)
            .field("voice", &self.voice)
            .field("solo", &self.solo)
            .field("playhead", &self.scheduler.playhead())
            .finish_non_exhaustive()
    }
}

fn device_error(err: TuneGuideError) -> TuneGuideError {
    match err {
        TuneGuideError::DeviceUnavailable(_) => err,
        other => TuneGuideError::device(other.to_string()),
    }
}
