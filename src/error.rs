// src/error.rs

use thiserror::Error;

/// Input could not be turned into samples. Retrying with the same bytes will fail again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("unsupported or unrecognized container: {0}")]
    Unsupported(String),

    #[error("no default audio track")]
    NoTrack,

    #[error("corrupt stream: {0}")]
    Corrupt(String),
}

/// Header or sample writing failed. Valid settings never hit this.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("output of {0} bytes does not fit a RIFF container")]
    TooLarge(u64),

    #[error("channel count {0} not encodable")]
    Channels(usize),

    #[error("unsupported bit depth {0}")]
    BitDepth(u16),
}

/// Audio context could not be created or resumed.
/// Usually cleared by a user gesture, never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("audio context is closed")]
    Closed,

    #[error("playback requires a user gesture before the context can start")]
    ActivationRequired,

    #[error("no output device available")]
    NoOutputDevice,

    #[error("output stream error: {0}")]
    Stream(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("no sample data provided")]
    NoData,

    #[error("window size must be non-zero")]
    ZeroWindow,

    #[error("out of memory reserving {0} peak chunks")]
    OutOfMemory(usize),

    #[error("analysis worker stopped: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid settings json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything that can end a single transcoding run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0} ms")]
    TimedOut(u128),

    #[error("internal error: {0}")]
    Internal(String),
}
