//! Realises the timeline as sound against engine time.
//!
//! Notes are turned into [`Tone`]s with absolute onset and offset timestamps
//! (`origin + start / tempoFactor`) and parked in a tone arena. Any change
//! that invalidates those timestamps (pause, stop, tempo, solo) halts every
//! tone in one sweep and, when playback continues, schedules again from the
//! current offset. Tones are never retuned in flight.

mod arena;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use arena::ToneHandle;

use self::arena::ToneArena;
use crate::{
    audio::EngineClock,
    config::SynthConfig,
    pitch::midi_to_hz,
    synth::Tone,
    timeline::{PlaybackClock, Timeline, VoiceId},
    Result, TuneGuideError,
};

/// Identifies one event of one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub voice: VoiceId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTone {
    pub key: EventKey,
    pub handle: ToneHandle,
    pub onset: f64,
    pub offset: f64,
}

/// Gain stage of one voice, feeding the shared output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceBus {
    pub voice: VoiceId,
    pub gain: f32,
}

#[derive(Debug)]
pub struct PlaybackScheduler {
    config: SynthConfig,
    sample_rate: u32,
    engine: EngineClock,
    clock: PlaybackClock,
    base_bpm: f64,
    buses: BTreeMap<VoiceId, VoiceBus>,
    solo: Option<VoiceId>,
    muted: BTreeSet<VoiceId>,
    arena: ToneArena,
    scheduled: HashMap<EventKey, ScheduledTone>,
}

impl PlaybackScheduler {
    pub fn new(config: SynthConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            engine: EngineClock::new(sample_rate),
            clock: PlaybackClock::new(),
            base_bpm: crate::score::DEFAULT_TEMPO_BPM,
            buses: BTreeMap::new(),
            solo: None,
            muted: BTreeSet::new(),
            arena: ToneArena::new(),
            scheduled: HashMap::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current engine time in seconds.
    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Score seconds under the playhead. Every other component reads the
    /// playhead from here (through the session context), never recomputes it.
    pub fn playhead(&self) -> f64 {
        self.clock.score_time(self.now())
    }

    pub fn tempo_factor(&self) -> f64 {
        self.clock.tempo_factor()
    }

    pub fn buses(&self) -> impl Iterator<Item = &VoiceBus> + '_ {
        self.buses.values()
    }

    pub fn bus(&self, voice: VoiceId) -> Option<&VoiceBus> {
        self.buses.get(&voice)
    }

    pub fn active_tones(&self) -> usize {
        self.arena.len()
    }

    /// Scheduled onsets, ordered by voice and event index.
    pub fn scheduled(&self) -> Vec<ScheduledTone> {
        let mut tones: Vec<_> = self.scheduled.values().copied().collect();
        tones.sort_by_key(|tone| tone.key);
        tones
    }

    /// Adopts a freshly loaded timeline: forgets the old tones, resets the
    /// transport and builds one bus per voice.
    pub fn load(&mut self, timeline: &Timeline) {
        self.halt();
        self.clock = PlaybackClock::new();
        self.base_bpm = timeline.tempo_bpm();
        self.muted.clear();
        self.solo = None;
        self.rebuild_buses(timeline);
    }

    /// Starts (or resumes) from the stored offset.
    pub fn start(&mut self, timeline: &Timeline) -> usize {
        self.halt();
        self.clock.start(self.now());
        let count = self.schedule(timeline);
        tracing::debug!(
            offset = self.clock.elapsed_offset(),
            tempo_factor = self.clock.tempo_factor(),
            tones = count,
            "playback scheduled"
        );
        count
    }

    /// Freezes the playhead and silences everything.
    pub fn pause(&mut self) {
        self.clock.pause(self.now());
        self.halt();
    }

    /// Silences everything and rewinds to the beginning.
    pub fn stop(&mut self) {
        self.clock.reset();
        self.halt();
    }

    pub fn set_tempo(&mut self, bpm: f64, timeline: &Timeline) -> Result<f64> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(TuneGuideError::InvalidInput("tempo must be a positive number"));
        }
        let tempo_factor = bpm / self.base_bpm;
        let running = self.is_running();
        self.halt();
        self.clock.set_tempo_factor(self.now(), tempo_factor);
        if running {
            self.schedule(timeline);
        }
        Ok(tempo_factor)
    }

    /// `Some(voice)` plays `voice` at full gain and the others attenuated;
    /// `None` plays everything at full gain.
    pub fn set_solo(&mut self, solo: Option<VoiceId>, timeline: &Timeline) {
        self.solo = solo;
        self.reseek(timeline, |scheduler| scheduler.rebuild_buses(timeline));
    }

    pub fn set_voice_muted(&mut self, voice: VoiceId, muted: bool, timeline: &Timeline) {
        let changed = if muted {
            self.muted.insert(voice)
        } else {
            self.muted.remove(&voice)
        };
        if changed {
            self.reseek(timeline, |scheduler| scheduler.rebuild_buses(timeline));
        }
    }

    pub fn is_muted(&self, voice: VoiceId) -> bool {
        self.muted.contains(&voice)
    }

    /// Mixes every live tone into `out` and advances engine time by
    /// `out.len()` samples.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let first = self.engine.position();
        let block_start = self.engine.time_at(first);
        let block_end = self.engine.time_at(first + out.len() as u64);
        let master = self.config.master_gain;

        for (_, active) in self.arena.iter_mut() {
            if active.tone.onset() >= block_end || active.tone.end() <= block_start {
                continue;
            }
            let gain = self
                .buses
                .get(&active.voice)
                .map_or(0.0, |bus| bus.gain)
                * master;
            for (i, sample) in out.iter_mut().enumerate() {
                let time = self.engine.time_at(first + i as u64);
                *sample += active.tone.next_sample(time) * gain;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.engine.advance(out.len());
        self.release_finished();
    }

    /// Advances engine time without producing audio (offline hosts that
    /// only need the clocks).
    pub fn advance(&mut self, frames: usize) {
        self.engine.advance(frames);
        self.release_finished();
    }

    fn schedule(&mut self, timeline: &Timeline) -> usize {
        let now = self.now();
        let tempo_factor = self.clock.tempo_factor();
        let earliest = now - self.config.resume_slack_seconds;
        let mut count = 0;

        for (voice, events) in timeline.voices() {
            if self.muted.contains(&voice) {
                continue;
            }
            for (index, event) in events.iter().enumerate() {
                let Some(midi) = event.midi() else {
                    continue;
                };
                let key = EventKey { voice, index };
                if self.scheduled.contains_key(&key) {
                    continue;
                }
                let Some(onset) = self.clock.engine_time(event.start_sec) else {
                    continue;
                };
                if onset < earliest {
                    continue;
                }
                let offset = onset + event.duration_sec() / tempo_factor;
                let tone = Tone::new(
                    midi_to_hz(midi as f32),
                    onset,
                    offset,
                    &self.config,
                    self.sample_rate,
                );
                let handle = self.arena.insert(voice, tone);
                self.scheduled.insert(
                    key,
                    ScheduledTone {
                        key,
                        handle,
                        onset,
                        offset,
                    },
                );
                count += 1;
            }
        }
        count
    }

    /// Releases every in-flight tone and forgets what was scheduled.
    fn halt(&mut self) {
        self.arena.clear();
        self.scheduled.clear();
    }

    fn reseek(&mut self, timeline: &Timeline, reconfigure: impl FnOnce(&mut Self)) {
        let running = self.is_running();
        if running {
            self.clock.pause(self.now());
        }
        self.halt();
        reconfigure(self);
        if running {
            self.clock.start(self.now());
            self.schedule(timeline);
        }
    }

    fn rebuild_buses(&mut self, timeline: &Timeline) {
        let main = self.config.solo_main_gain;
        let other = self.config.solo_other_gain;
        self.buses = timeline
            .voice_ids()
            .map(|voice| {
                let gain = if self.muted.contains(&voice) {
                    0.0
                } else {
                    match self.solo {
                        Some(solo) if solo != voice => other,
                        _ => main,
                    }
                };
                (voice, VoiceBus { voice, gain })
            })
            .collect();
    }

    fn release_finished(&mut self) {
        let now = self.now();
        let arena = &mut self.arena;
        self.scheduled.retain(|_, scheduled| {
            let finished = arena
                .get(scheduled.handle)
                .map_or(true, |active| active.tone.is_finished(now));
            if finished {
                arena.release(scheduled.handle);
            }
            !finished
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Score, ScoreNote, ScorePart};

    const SAMPLE_RATE: u32 = 8_000;

    fn timeline(parts: usize) -> Timeline {
        let score = Score {
            tempo_bpm: Some(60.0),
            parts: (0..parts)
                .map(|p| ScorePart {
                    voice: None,
                    divisions: Some(1),
                    notes: vec![
                        ScoreNote::note("C", 0, 4 + p as i32, 1),
                        ScoreNote::note("D", 0, 4 + p as i32, 1),
                    ],
                })
                .collect(),
        };
        Timeline::build(&score).unwrap()
    }

    fn scheduler(timeline: &Timeline) -> PlaybackScheduler {
        let mut scheduler = PlaybackScheduler::new(SynthConfig::default(), SAMPLE_RATE);
        scheduler.load(timeline);
        scheduler
    }

    fn onsets(scheduler: &PlaybackScheduler) -> Vec<f64> {
        scheduler.scheduled().iter().map(|tone| tone.onset).collect()
    }

    #[test]
    fn tempo_factor_scales_onsets() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        scheduler.set_tempo(120.0, &timeline).unwrap();
        scheduler.start(&timeline);

        let origin = scheduler.clock().origin().unwrap();
        let tones = scheduler.scheduled();
        assert_eq!(tones.len(), 2);
        assert!((tones[0].onset - origin).abs() < 1e-9);
        assert!((tones[1].onset - (origin + 0.5)).abs() < 1e-9);
        assert!((tones[1].offset - (origin + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn resume_skips_notes_already_past() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);
        scheduler.advance((SAMPLE_RATE as f64 * 1.2) as usize);
        scheduler.pause();
        assert_eq!(scheduler.active_tones(), 0);
        assert!((scheduler.playhead() - 1.2).abs() < 1e-3);

        scheduler.advance(SAMPLE_RATE as usize * 5);
        assert_eq!(scheduler.start(&timeline), 0);
        assert!((scheduler.playhead() - 1.2).abs() < 1e-3);
    }

    #[test]
    fn resume_slack_keeps_just_missed_onsets() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);
        scheduler.advance((SAMPLE_RATE as f64 * 1.02) as usize);
        scheduler.pause();

        assert_eq!(scheduler.start(&timeline), 1);
        let now = scheduler.now();
        assert!((onsets(&scheduler)[0] - (now - 0.02)).abs() < 1e-3);
    }

    #[test]
    fn restart_never_double_schedules() {
        let timeline = timeline(2);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);
        scheduler.start(&timeline);
        assert_eq!(scheduler.scheduled().len(), 4);
        assert_eq!(scheduler.active_tones(), 4);

        scheduler.stop();
        assert_eq!(scheduler.active_tones(), 0);
        assert_eq!(scheduler.playhead(), 0.0);
    }

    #[test]
    fn solo_attenuates_other_voices_and_keeps_position() {
        let timeline = timeline(3);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);
        scheduler.advance(SAMPLE_RATE as usize / 2);

        scheduler.set_solo(Some(VoiceId(1)), &timeline);
        let gains: Vec<_> = scheduler.buses().map(|bus| bus.gain).collect();
        assert_eq!(gains, vec![0.15, 1.0, 0.15]);
        assert!((scheduler.playhead() - 0.5).abs() < 1e-3);
        assert!(scheduler.is_running());
        // the first notes began 0.5 s ago, past the resume slack
        assert_eq!(scheduler.scheduled().len(), 3);

        scheduler.set_solo(None, &timeline);
        assert!(scheduler.buses().all(|bus| bus.gain == 1.0));
    }

    #[test]
    fn muted_voices_are_not_scheduled() {
        let timeline = timeline(2);
        let mut scheduler = scheduler(&timeline);
        scheduler.set_voice_muted(VoiceId(0), true, &timeline);
        scheduler.start(&timeline);

        assert!(scheduler
            .scheduled()
            .iter()
            .all(|tone| tone.key.voice == VoiceId(1)));
        assert_eq!(scheduler.bus(VoiceId(0)).map(|bus| bus.gain), Some(0.0));
    }

    #[test]
    fn renders_audio_and_releases_finished_tones() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);

        let mut block = vec![0.0f32; 400];
        scheduler.render(&mut block);
        assert!(block.iter().any(|sample| sample.abs() > 0.01));

        let mut sink = vec![0.0f32; SAMPLE_RATE as usize * 3];
        scheduler.render(&mut sink);
        assert_eq!(scheduler.active_tones(), 0);
        assert!(scheduler.scheduled().is_empty());
    }

    #[test]
    fn releases_tones_as_they_end() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        scheduler.start(&timeline);

        let mut block = vec![0.0f32; SAMPLE_RATE as usize / 2];
        scheduler.render(&mut block);
        scheduler.render(&mut block);
        scheduler.render(&mut block);

        // the first note died away at 1.12 s, the second is still sounding
        let left: Vec<_> = scheduler.scheduled().iter().map(|tone| tone.key.index).collect();
        assert_eq!(left, vec![1]);
        assert_eq!(scheduler.active_tones(), 1);
    }

    #[test]
    fn rejects_bad_tempo() {
        let timeline = timeline(1);
        let mut scheduler = scheduler(&timeline);
        assert!(scheduler.set_tempo(0.0, &timeline).is_err());
        assert!(scheduler.set_tempo(f64::NAN, &timeline).is_err());
        assert_eq!(scheduler.tempo_factor(), 1.0);
    }
}
