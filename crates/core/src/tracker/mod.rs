//! Forward-only cursor that resolves which event of the selected voice the
//! singer should be producing.
//!
//! The cursor only ever moves forward between resets, so jittery or repeated
//! ticks can never send the target back to an earlier note.

use crate::timeline::{NoteEvent, VoiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking { index: usize },
}

#[derive(Debug, Clone)]
pub struct TargetTracker {
    voice: VoiceId,
    events: Vec<NoteEvent>,
    state: TrackerState,
}

impl TargetTracker {
    pub fn new(voice: VoiceId, events: &[NoteEvent]) -> Self {
        Self {
            voice,
            events: events.to_vec(),
            state: TrackerState::Idle,
        }
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Cursor position; `0` while idle.
    pub fn index(&self) -> usize {
        match self.state {
            TrackerState::Idle => 0,
            TrackerState::Tracking { index } => index,
        }
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    /// Points the cursor at the first event and returns it.
    pub fn resolve_first(&mut self) -> Option<&NoteEvent> {
        if self.events.is_empty() {
            self.state = TrackerState::Idle;
            return None;
        }
        self.state = TrackerState::Tracking { index: 0 };
        self.events.first()
    }

    /// Resolves the target at `playhead` (score seconds).
    ///
    /// `None` means "nothing new to report": callers keep the target they
    /// already hold instead of treating it as the absence of a target.
    pub fn tick(&mut self, playhead: f64, lookahead: f64) -> Option<&NoteEvent> {
        let TrackerState::Tracking { index } = self.state else {
            return None;
        };
        let horizon = playhead + lookahead;

        if let Some(next) = self.events.get(index + 1) {
            if horizon >= next.start_sec {
                self.state = TrackerState::Tracking { index: index + 1 };
                return self.events.get(index + 1);
            }
        }

        let current = self.events.get(index)?;
        if horizon >= current.start_sec {
            Some(current)
        } else {
            None
        }
    }

    /// Ticks until the cursor stops moving. Used when tracking begins at a
    /// playhead far from the first event (voice switches mid-song).
    pub fn catch_up(&mut self, playhead: f64, lookahead: f64) -> Option<&NoteEvent> {
        loop {
            let before = self.index();
            let moved = self.tick(playhead, lookahead).is_some() && self.index() != before;
            if !moved {
                break;
            }
        }
        self.tick(playhead, lookahead)
    }

    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }
}
