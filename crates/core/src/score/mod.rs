//! Input model handed over by the score loader.
//!
//! Parsing a notation file is somebody else's job; this module only describes
//! the note list the loader produces and the helpers needed to turn its raw
//! pitch and duration data into numbers the timeline can use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Tempo assumed when the score does not declare one.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub tempo_bpm: Option<f64>,
    #[serde(default)]
    pub parts: Vec<ScorePart>,
}

impl Score {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm.unwrap_or(DEFAULT_TEMPO_BPM)
    }
}

/// One part of the score. Each part becomes one voice of the timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorePart {
    #[serde(default)]
    pub voice: Option<u32>,
    /// Divisions per beat in effect at the start of the part.
    #[serde(default)]
    pub divisions: Option<u32>,
    #[serde(default)]
    pub notes: Vec<ScoreNote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreNote {
    #[serde(default)]
    pub rest: bool,
    #[serde(default)]
    pub pitch: Option<ScorePitch>,
    /// Pre-computed MIDI number; wins over `pitch` when both are present.
    #[serde(default)]
    pub midi: Option<i32>,
    /// Duration in divisions. A missing duration lasts one beat.
    #[serde(default)]
    pub duration: Option<u32>,
    /// New divisions-per-beat, in effect from this note onwards.
    #[serde(default)]
    pub divisions: Option<u32>,
    #[serde(default)]
    pub lyric: Option<String>,
}

impl ScoreNote {
    pub fn note(step: &str, alter: i32, octave: i32, duration: u32) -> Self {
        Self {
            pitch: Some(ScorePitch {
                step: step.to_string(),
                alter,
                octave,
            }),
            duration: Some(duration),
            ..Default::default()
        }
    }

    pub fn rest(duration: u32) -> Self {
        Self {
            rest: true,
            duration: Some(duration),
            ..Default::default()
        }
    }

    pub fn with_lyric(mut self, lyric: impl Into<String>) -> Self {
        self.lyric = Some(lyric.into());
        self
    }

    /// Resolves the MIDI number, or explains why it cannot be resolved.
    pub fn resolve_midi(&self) -> std::result::Result<u8, String> {
        let midi = match (self.midi, &self.pitch) {
            (Some(midi), _) => midi,
            (None, Some(pitch)) => pitch_to_midi(&pitch.step, pitch.alter, pitch.octave)
                .ok_or_else(|| format!("unknown pitch step `{}`", pitch.step))?,
            (None, None) => return Err("note has no pitch".to_string()),
        };

        u8::try_from(midi)
            .ok()
            .filter(|midi| *midi <= 127)
            .ok_or_else(|| format!("midi number {midi} is out of range"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePitch {
    pub step: String,
    #[serde(default)]
    pub alter: i32,
    pub octave: i32,
}

/// `12·(octave + 1) + step + alter`, so C4 is 60.
pub fn pitch_to_midi(step: &str, alter: i32, octave: i32) -> Option<i32> {
    let base = match step.trim().to_ascii_uppercase().as_str() {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    };
    Some(12 * (octave + 1) + base + alter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_steps_to_midi() {
        assert_eq!(pitch_to_midi("C", 0, 4), Some(60));
        assert_eq!(pitch_to_midi("A", 0, 4), Some(69));
        assert_eq!(pitch_to_midi("F", 1, 3), Some(54));
        assert_eq!(pitch_to_midi("b", -1, 2), Some(46));
        assert_eq!(pitch_to_midi("H", 0, 4), None);
    }

    #[test]
    fn explicit_midi_wins_and_is_range_checked() {
        let mut note = ScoreNote::note("C", 0, 4, 1);
        note.midi = Some(72);
        assert_eq!(note.resolve_midi(), Ok(72));

        note.midi = Some(200);
        assert!(note.resolve_midi().unwrap_err().contains("out of range"));

        let bare = ScoreNote::default();
        assert!(bare.resolve_midi().is_err());
    }

    #[test]
    fn parses_loader_json() {
        let score = Score::from_json_str(
            r#"{
                "tempo_bpm": 90,
                "parts": [
                    { "divisions": 2, "notes": [
                        { "pitch": { "step": "E", "octave": 4 }, "duration": 2, "lyric": "la" },
                        { "rest": true, "duration": 1 }
                    ] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(score.tempo(), 90.0);
        assert_eq!(score.parts[0].notes.len(), 2);
        assert_eq!(score.parts[0].notes[0].resolve_midi(), Ok(64));
        assert!(score.parts[0].notes[1].rest);
    }

    #[test]
    fn missing_tempo_defaults() {
        let score = Score::from_json_str(r#"{ "parts": [] }"#).unwrap();
        assert_eq!(score.tempo(), DEFAULT_TEMPO_BPM);
    }
}
