use std::f64::consts::TAU;

use tuneguide_core::{pitch::midi_to_hz, NoteEvent};

/// Stand-in for a microphone: sings one voice of the timeline, optionally
/// off by a fixed number of cents. Hands out each new block for recording and
/// the overlapping analysis window for detection.
pub struct SyntheticSinger {
    events: Vec<NoteEvent>,
    detune_ratio: f64,
    sample_rate: f64,
    phase: f64,
    block: Vec<f32>,
    window: Vec<f32>,
    window_len: usize,
}

impl SyntheticSinger {
    pub fn new(
        events: &[NoteEvent],
        detune_cents: f64,
        sample_rate: u32,
        window_len: usize,
    ) -> Self {
        Self {
            events: events.to_vec(),
            detune_ratio: 2f64.powf(detune_cents / 1200.0),
            sample_rate: sample_rate as f64,
            phase: 0.0,
            block: Vec::new(),
            window: Vec::with_capacity(window_len),
            window_len,
        }
    }

    fn frequency_at(&self, playhead: f64) -> Option<f64> {
        self.events
            .iter()
            .find(|event| event.start_sec <= playhead && playhead < event.end_sec)
            .and_then(NoteEvent::midi)
            .map(|midi| midi_to_hz(midi as f32) as f64 * self.detune_ratio)
    }

    /// Sings `frames` samples at the note under `playhead` (score seconds)
    /// and returns just those samples.
    pub fn sing(&mut self, playhead: f64, frames: usize) -> &[f32] {
        let frequency = self.frequency_at(playhead);
        self.block.clear();
        for _ in 0..frames {
            let sample = match frequency {
                Some(frequency) => {
                    self.phase = (self.phase + frequency / self.sample_rate).fract();
                    0.4 * (TAU * self.phase).sin() as f32
                }
                None => 0.0,
            };
            self.block.push(sample);
        }

        self.window.extend_from_slice(&self.block);
        if self.window.len() > self.window_len {
            let excess = self.window.len() - self.window_len;
            self.window.drain(..excess);
        }
        &self.block
    }

    /// Latest full analysis window, once enough has been sung.
    pub fn frame(&self) -> Option<&[f32]> {
        (self.window.len() == self.window_len).then_some(self.window.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneguide_core::{Score, ScoreNote, ScorePart, Timeline, VoiceId};

    #[test]
    fn sings_the_note_under_the_playhead() {
        let score = Score {
            tempo_bpm: Some(60.0),
            parts: vec![ScorePart {
                voice: None,
                divisions: Some(1),
                notes: vec![ScoreNote::note("A", 0, 4, 1), ScoreNote::rest(1)],
            }],
        };
        let timeline = Timeline::build(&score).unwrap();
        let events = timeline.voice(VoiceId(0)).unwrap();
        let mut singer = SyntheticSinger::new(events, 100.0, 8_000, 256);

        assert_eq!(singer.sing(0.0, 128).len(), 128);
        assert!(singer.frame().is_none());
        let block = singer.sing(0.1, 128).to_vec();
        let frame = singer.frame().expect("a full window");
        assert_eq!(&frame[128..], block.as_slice());
        let frequency = singer.frequency_at(0.5).unwrap();
        assert!((frequency - 466.16).abs() < 0.1);
        assert!(singer.frequency_at(1.5).is_none());
    }
}
