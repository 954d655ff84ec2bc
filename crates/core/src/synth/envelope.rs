use crate::config::SynthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Pending,
    Attack,
    Decay,
    Sustain,
    Release,
    Complete,
}

/// Four-stage amplitude envelope evaluated against absolute engine time.
///
/// Nothing is accumulated from sample to sample: the level at any instant is
/// a function of that instant and the note's onset/offset timestamps, which
/// keeps rescheduled notes sample accurate.
///
/// 1. Attack: linear ramp from the floor to the peak
/// 2. Decay: exponential fall from the peak to the sustain level, ending at
///    `onset + decay`
/// 3. Sustain: held until the offset
/// 4. Release: exponential fall from whatever level the offset caught
#[derive(Debug, Clone)]
pub struct Envelope {
    onset: f64,
    offset: f64,
    attack: f64,
    decay_end: f64,
    release: f64,
    peak: f32,
    sustain: f32,
    floor: f32,
}

impl Envelope {
    pub fn new(onset: f64, offset: f64, config: &SynthConfig) -> Self {
        let floor = config.floor_level.max(1e-6);
        let attack = config.attack_seconds.max(0.0);
        Self {
            onset,
            offset: offset.max(onset),
            attack,
            decay_end: config.decay_seconds.max(attack),
            release: config.release_seconds.max(1e-3),
            peak: config.peak_level.max(floor),
            sustain: config.sustain_level.max(floor),
            floor,
        }
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Instant after which the envelope is silent.
    pub fn end(&self) -> f64 {
        self.offset + self.release
    }

    pub fn stage(&self, time: f64) -> EnvelopeStage {
        let elapsed = time - self.onset;
        if elapsed < 0.0 {
            EnvelopeStage::Pending
        } else if time >= self.end() {
            EnvelopeStage::Complete
        } else if time >= self.offset {
            EnvelopeStage::Release
        } else if elapsed < self.attack {
            EnvelopeStage::Attack
        } else if elapsed < self.decay_end {
            EnvelopeStage::Decay
        } else {
            EnvelopeStage::Sustain
        }
    }

    pub fn level(&self, time: f64) -> f32 {
        match self.stage(time) {
            EnvelopeStage::Pending | EnvelopeStage::Complete => 0.0,
            EnvelopeStage::Release => {
                let start = self.held_level(self.offset).max(self.floor);
                let progress = ((time - self.offset) / self.release) as f32;
                exponential(start, self.floor, progress)
            }
            _ => self.held_level(time),
        }
    }

    /// Level ignoring the release, i.e. as if the key were still down.
    fn held_level(&self, time: f64) -> f32 {
        let elapsed = time - self.onset;
        if elapsed < 0.0 {
            0.0
        } else if elapsed < self.attack {
            let progress = (elapsed / self.attack) as f32;
            self.floor + (self.peak - self.floor) * progress
        } else if elapsed < self.decay_end {
            let progress = ((elapsed - self.attack) / (self.decay_end - self.attack)) as f32;
            exponential(self.peak, self.sustain, progress)
        } else {
            self.sustain
        }
    }
}

/// Exponential ramp between two positive levels, `progress` in `[0, 1]`.
pub(crate) fn exponential(from: f32, to: f32, progress: f32) -> f32 {
    from * (to / from).powf(progress.clamp(0.0, 1.0))
}
