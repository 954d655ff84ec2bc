//! Engine time base and the seams to the host's audio devices.
//!
//! Capture and playback are independent: the capture side only ever hands
//! PCM frames to the session, the playback side only ever pulls rendered
//! blocks out of it. They share no buffers.

use crate::{record::RecordedTake, Result};

/// Sample-counting clock of the playback engine.
///
/// Engine time only moves when audio is rendered, so every timestamp the
/// scheduler produces maps onto an exact sample index.
#[derive(Debug, Clone)]
pub struct EngineClock {
    sample_rate: u32,
    position: u64,
}

impl EngineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            position: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples rendered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn now(&self) -> f64 {
        self.time_at(self.position)
    }

    pub fn time_at(&self, position: u64) -> f64 {
        position as f64 / self.sample_rate as f64
    }

    pub fn advance(&mut self, frames: usize) {
        self.position += frames as u64;
    }
}

/// Playback device the rendered blocks are written to.
pub trait OutputDevice {
    /// Prepares the device. Failing here aborts the session start with
    /// [`crate::TuneGuideError::DeviceUnavailable`].
    fn open(&mut self, sample_rate: u32, block_size: usize) -> Result<()>;

    fn close(&mut self);
}

/// Microphone side. The device only needs to be started and stopped, and
/// may keep a copy of what it heard.
///
/// The recorded stream and the detector frames are separate: analysis
/// windows overlap, so only freshly captured blocks
/// ([`crate::SessionController::on_captured_block`]) reach `on_block`.
pub trait CaptureDevice {
    fn start(&mut self) -> Result<()>;

    /// Stops capturing and hands back the recorded take, if any.
    fn stop(&mut self) -> Result<Option<RecordedTake>>;

    /// Receives each new block of captured samples while capturing.
    fn on_block(&mut self, _block: &[f32]) {}
}

/// Output for offline hosts that consume rendered blocks themselves.
#[derive(Debug, Default)]
pub struct NullOutput {
    open: bool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl OutputDevice for NullOutput {
    fn open(&mut self, _sample_rate: u32, _block_size: usize) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
