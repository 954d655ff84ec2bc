use crate::timeline::VoiceId;

/// Result alias that carries the custom [`TuneGuideError`] type.
pub type Result<T> = std::result::Result<T, TuneGuideError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TuneGuideError {
    /// Free-form failure reported by a collaborator (device backends, hosts).
    #[error("{0}")]
    Message(String),
    /// A caller handed the engine a value it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A single score note could not be turned into a timeline event. The
    /// timeline builder reports and skips these; it never aborts on them.
    #[error("part {part}, note {index}: {reason}")]
    InvalidScoreNote {
        part: usize,
        index: usize,
        reason: String,
    },
    /// Capture or playback engine failed to come up for this session start.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("voice {0} does not exist in the loaded timeline")]
    UnknownVoice(VoiceId),
    #[error("no timeline has been loaded")]
    NoTimeline,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl TuneGuideError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Wraps a backend failure as a device error.
    pub fn device<T: Into<String>>(reason: T) -> Self {
        Self::DeviceUnavailable(reason.into())
    }
}

impl From<&str> for TuneGuideError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TuneGuideError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
