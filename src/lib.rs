// src/lib.rs

pub mod decoder;
pub mod error;
pub mod live;
pub mod pipeline;
pub mod settings;
pub mod waveform;

pub use decoder::{AudioSource, DecodedAudio};
pub use error::{AnalysisError, ContextError, DecodeError, EncodeError, PipelineError};
pub use live::{AudioContext, LiveGraphConfig, LiveGraphManager, MediaElement};
pub use pipeline::{EncodedResult, TranscodeWorker, WorkerMessage, transcode};
pub use settings::{EnhancementSettings, OutputFormat};
pub use waveform::{PeakChunk, PeakSequence, WaveformRenderer, reduce_peaks};
