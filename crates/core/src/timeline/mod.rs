use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    pitch::note_name,
    score::{Score, ScoreNote},
    Result, TuneGuideError,
};

/// Identifier of one voice (part) of the score.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VoiceId(pub u32);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NoteKind {
    Note { midi: u8 },
    Rest,
}

/// A single note or rest of one voice, timed in both beats and score seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteKind,
    pub voice: VoiceId,
    pub start_beat: f64,
    pub duration_beats: f64,
    pub start_sec: f64,
    pub end_sec: f64,
    pub lyric: Option<String>,
}

impl NoteEvent {
    pub fn midi(&self) -> Option<u8> {
        match self.kind {
            NoteKind::Note { midi } => Some(midi),
            NoteKind::Rest => None,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, NoteKind::Rest)
    }

    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    /// Human readable label such as `A4` or `rest`.
    pub fn label(&self) -> String {
        self.midi().map(note_name).unwrap_or_else(|| "rest".to_string())
    }
}

/// Immutable per-voice event lists built once from a [`Score`].
///
/// Within a voice, events are sorted by start, contiguous, non-overlapping
/// and of positive duration.
#[derive(Debug, Clone)]
pub struct Timeline {
    tempo_bpm: f64,
    seconds_per_beat: f64,
    voices: BTreeMap<VoiceId, Vec<NoteEvent>>,
    skipped_notes: usize,
}

impl Timeline {
    pub fn build(score: &Score) -> Result<Self> {
        let tempo_bpm = score.tempo();
        if !(tempo_bpm.is_finite() && tempo_bpm > 0.0) {
            return Err(TuneGuideError::InvalidInput("score tempo must be positive"));
        }
        let seconds_per_beat = 60.0 / tempo_bpm;

        let mut voices = BTreeMap::new();
        let mut skipped_notes = 0;

        for (part_index, part) in score.parts.iter().enumerate() {
            let voice = assign_voice(part.voice, part_index as u32, &voices);
            let mut divisions = part.divisions.unwrap_or(1).max(1);
            let mut beat = 0.0;
            let mut events = Vec::with_capacity(part.notes.len());

            for (note_index, note) in part.notes.iter().enumerate() {
                if let Some(next) = note.divisions.filter(|d| *d > 0) {
                    divisions = next;
                }

                let duration_beats = note
                    .duration
                    .map(|units| units as f64 / divisions as f64)
                    .unwrap_or(1.0);
                if duration_beats <= 0.0 {
                    skipped_notes += 1;
                    tracing::warn!(
                        part = part_index,
                        note = note_index,
                        "dropping zero-length note"
                    );
                    continue;
                }

                let kind = match resolve_kind(note) {
                    Ok(kind) => kind,
                    Err(reason) => {
                        skipped_notes += 1;
                        let err = TuneGuideError::InvalidScoreNote {
                            part: part_index,
                            index: note_index,
                            reason,
                        };
                        tracing::warn!(%err, "replacing unreadable note with a rest");
                        NoteKind::Rest
                    }
                };

                let start_sec = beat * seconds_per_beat;
                events.push(NoteEvent {
                    kind,
                    voice,
                    start_beat: beat,
                    duration_beats,
                    start_sec,
                    end_sec: start_sec + duration_beats * seconds_per_beat,
                    lyric: note.lyric.clone(),
                });
                beat += duration_beats;
            }

            voices.insert(voice, events);
        }

        tracing::debug!(
            tempo_bpm,
            voices = voices.len(),
            skipped_notes,
            "timeline built"
        );

        Ok(Self {
            tempo_bpm,
            seconds_per_beat,
            voices,
            skipped_notes,
        })
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn seconds_per_beat(&self) -> f64 {
        self.seconds_per_beat
    }

    pub fn skipped_notes(&self) -> usize {
        self.skipped_notes
    }

    pub fn voice_ids(&self) -> impl Iterator<Item = VoiceId> + '_ {
        self.voices.keys().copied()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn contains_voice(&self, voice: VoiceId) -> bool {
        self.voices.contains_key(&voice)
    }

    /// The ascending event list of one voice.
    pub fn voice(&self, voice: VoiceId) -> Option<&[NoteEvent]> {
        self.voices.get(&voice).map(Vec::as_slice)
    }

    pub fn voices(&self) -> impl Iterator<Item = (VoiceId, &[NoteEvent])> + '_ {
        self.voices.iter().map(|(id, events)| (*id, events.as_slice()))
    }

    /// Score-time length of the longest voice.
    pub fn duration_seconds(&self) -> f64 {
        self.voices
            .values()
            .filter_map(|events| events.last())
            .map(|event| event.end_sec)
            .fold(0.0, f64::max)
    }

    /// Lowest and highest pitched note across all voices.
    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        self.voices
            .values()
            .flatten()
            .filter_map(NoteEvent::midi)
            .fold(None, |range, midi| match range {
                None => Some((midi, midi)),
                Some((lo, hi)) => Some((lo.min(midi), hi.max(midi))),
            })
    }
}

fn resolve_kind(note: &ScoreNote) -> std::result::Result<NoteKind, String> {
    if note.rest {
        return Ok(NoteKind::Rest);
    }
    note.resolve_midi().map(|midi| NoteKind::Note { midi })
}

fn assign_voice(
    declared: Option<u32>,
    part_index: u32,
    taken: &BTreeMap<VoiceId, Vec<NoteEvent>>,
) -> VoiceId {
    let wanted = VoiceId(declared.unwrap_or(part_index));
    if !taken.contains_key(&wanted) {
        return wanted;
    }
    let mut candidate = part_index;
    while taken.contains_key(&VoiceId(candidate)) {
        candidate += 1;
    }
    tracing::warn!(%wanted, assigned = candidate, "voice id already used by an earlier part");
    VoiceId(candidate)
}

/// Maps engine time onto score time.
///
/// The elapsed offset is kept in score seconds, so the playhead stays
/// continuous across pauses and tempo changes: every (re)start derives the
/// origin from the stored offset and the current tempo factor.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    origin: Option<f64>,
    elapsed_offset: f64,
    tempo_factor: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            origin: None,
            elapsed_offset: 0.0,
            tempo_factor: 1.0,
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the clock so that `now` corresponds to the stored offset.
    pub fn start(&mut self, now: f64) {
        self.origin = Some(now - self.elapsed_offset / self.tempo_factor);
    }

    /// Freezes the playhead at its current value.
    pub fn pause(&mut self, now: f64) {
        self.elapsed_offset = self.score_time(now);
        self.origin = None;
    }

    /// Rewinds to the beginning and stops.
    pub fn reset(&mut self) {
        self.origin = None;
        self.elapsed_offset = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.origin.is_some()
    }

    pub fn origin(&self) -> Option<f64> {
        self.origin
    }

    pub fn tempo_factor(&self) -> f64 {
        self.tempo_factor
    }

    pub fn elapsed_offset(&self) -> f64 {
        self.elapsed_offset
    }

    /// Changes the tempo factor, keeping the playhead where it is.
    pub fn set_tempo_factor(&mut self, now: f64, tempo_factor: f64) {
        let running = self.is_running();
        self.elapsed_offset = self.score_time(now);
        self.tempo_factor = tempo_factor;
        if running {
            self.start(now);
        }
    }

    /// Score seconds elapsed at engine time `now`.
    pub fn score_time(&self, now: f64) -> f64 {
        match self.origin {
            Some(origin) => ((now - origin) * self.tempo_factor).max(0.0),
            None => self.elapsed_offset,
        }
    }

    /// Engine time at which a score instant is reached.
    pub fn engine_time(&self, score_seconds: f64) -> Option<f64> {
        self.origin
            .map(|origin| origin + score_seconds / self.tempo_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScorePart;

    fn part(voice: Option<u32>, notes: Vec<ScoreNote>) -> ScorePart {
        ScorePart {
            voice,
            divisions: Some(2),
            notes,
        }
    }

    #[test]
    fn builds_contiguous_voice_in_beats_and_seconds() {
        let score = Score {
            tempo_bpm: Some(120.0),
            parts: vec![part(
                None,
                vec![
                    ScoreNote::note("C", 0, 4, 2).with_lyric("do"),
                    ScoreNote::rest(1),
                    ScoreNote::note("D", 0, 4, 3),
                ],
            )],
        };

        let timeline = Timeline::build(&score).unwrap();
        let events = timeline.voice(VoiceId(0)).unwrap();

        assert_eq!(timeline.seconds_per_beat(), 0.5);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].midi(), Some(60));
        assert_eq!(events[0].lyric.as_deref(), Some("do"));
        assert_eq!(events[1].start_beat, 1.0);
        assert!(events[1].is_rest());
        assert_eq!(events[2].start_beat, 1.5);
        assert_eq!(events[2].duration_beats, 1.5);
        assert!((events[2].start_sec - 0.75).abs() < 1e-9);
        assert!((events[2].end_sec - 1.5).abs() < 1e-9);
        for pair in events.windows(2) {
            assert!((pair[0].end_sec - pair[1].start_sec).abs() < 1e-9);
        }
        assert!((timeline.duration_seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn divisions_change_mid_part() {
        let mut second = ScoreNote::note("E", 0, 4, 4);
        second.divisions = Some(4);
        let score = Score {
            tempo_bpm: Some(60.0),
            parts: vec![part(None, vec![ScoreNote::note("C", 0, 4, 2), second])],
        };

        let timeline = Timeline::build(&score).unwrap();
        let events = timeline.voice(VoiceId(0)).unwrap();
        assert_eq!(events[1].start_beat, 1.0);
        assert_eq!(events[1].duration_beats, 1.0);
    }

    #[test]
    fn unreadable_notes_become_rests_and_keep_alignment() {
        let broken = ScoreNote {
            duration: Some(2),
            ..Default::default()
        };
        let score = Score {
            tempo_bpm: None,
            parts: vec![part(
                None,
                vec![
                    ScoreNote::note("C", 0, 4, 2),
                    broken,
                    ScoreNote {
                        duration: Some(0),
                        ..ScoreNote::note("G", 0, 4, 0)
                    },
                    ScoreNote::note("E", 0, 4, 2),
                ],
            )],
        };

        let timeline = Timeline::build(&score).unwrap();
        let events = timeline.voice(VoiceId(0)).unwrap();

        assert_eq!(timeline.skipped_notes(), 2);
        assert_eq!(events.len(), 3);
        assert!(events[1].is_rest());
        assert_eq!(events[2].midi(), Some(64));
        assert_eq!(events[2].start_beat, 2.0);
    }

    #[test]
    fn voices_default_to_part_index_and_never_collide() {
        let score = Score {
            tempo_bpm: Some(100.0),
            parts: vec![
                part(None, vec![ScoreNote::note("C", 0, 4, 2)]),
                part(Some(0), vec![ScoreNote::note("E", 0, 4, 2)]),
                part(Some(7), vec![ScoreNote::note("G", 0, 4, 2)]),
            ],
        };

        let timeline = Timeline::build(&score).unwrap();
        let ids: Vec<_> = timeline.voice_ids().collect();
        assert_eq!(ids, vec![VoiceId(0), VoiceId(1), VoiceId(7)]);
        assert_eq!(timeline.pitch_range(), Some((60, 67)));
    }

    #[test]
    fn rejects_non_positive_tempo() {
        let score = Score {
            tempo_bpm: Some(0.0),
            parts: Vec::new(),
        };
        assert!(Timeline::build(&score).is_err());
    }

    #[test]
    fn clock_survives_pause_and_tempo_change() {
        let mut clock = PlaybackClock::new();
        clock.start(10.0);
        assert!((clock.score_time(12.0) - 2.0).abs() < 1e-9);

        clock.pause(12.0);
        assert!((clock.score_time(50.0) - 2.0).abs() < 1e-9);

        clock.start(50.0);
        clock.set_tempo_factor(51.0, 2.0);
        assert!((clock.score_time(51.0) - 3.0).abs() < 1e-9);
        assert!((clock.score_time(52.0) - 5.0).abs() < 1e-9);
        assert!((clock.engine_time(5.0).unwrap() - 52.0).abs() < 1e-9);

        clock.reset();
        assert_eq!(clock.score_time(99.0), 0.0);
        assert!(!clock.is_running());
    }
}
