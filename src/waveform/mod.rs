// src/waveform/mod.rs

pub mod canvas;
pub mod frame_loop;
pub mod renderer;
pub mod terminal;
pub mod timeline;
pub mod worker;

pub use renderer::{PlaybackClock, RendererConfig, RendererState, WaveformColor, WaveformRenderer};
pub use worker::{PeakJob, PeakMessage, PeakReducer};

use crate::error::AnalysisError;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Samples summarized by one [`PeakChunk`].
pub const PEAK_WINDOW: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakChunk {
    pub min: f32,
    pub max: f32,
}

impl PeakChunk {
    pub fn amplitude(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// Reduce `samples` to one `{min, max}` per consecutive `window`; the last window may be short.
///
/// Pure: the same input and window always produce the same chunks.
pub fn reduce_peaks(samples: &[f32], window: usize) -> Result<Vec<PeakChunk>, AnalysisError> {
    if window == 0 {
        return Err(AnalysisError::ZeroWindow);
    }
    if samples.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let count = samples.len().div_ceil(window);
    let mut peaks = Vec::new();
    peaks
        .try_reserve_exact(count)
        .map_err(|_| AnalysisError::OutOfMemory(count))?;

    for chunk in samples.chunks(window) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &s in chunk {
            if s < min {
                min = s;
            }
            if s > max {
                max = s;
            }
        }
        peaks.push(PeakChunk { min, max });
    }
    Ok(peaks)
}

/// Immutable peak summary of a whole buffer.
///
/// Chunk `i` sits at time `i * duration / len`. Cloning shares the chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSequence {
    chunks: Arc<[PeakChunk]>,
    duration: f64,
}

impl PeakSequence {
    pub fn new(chunks: Vec<PeakChunk>, duration: f64) -> Self {
        Self {
            chunks: chunks.into(),
            duration: duration.max(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn chunks(&self) -> &[PeakChunk] {
        &self.chunks
    }

    pub fn get(&self, index: usize) -> Option<PeakChunk> {
        self.chunks.get(index).copied()
    }

    /// Seconds covered by one chunk.
    pub fn chunk_duration(&self) -> f64 {
        if self.chunks.is_empty() {
            0.0
        } else {
            self.duration / self.chunks.len() as f64
        }
    }

    /// `floor(time / duration * len)`. May fall outside the sequence.
    pub fn index_at(&self, time: f64) -> i64 {
        if self.duration <= 0.0 {
            return 0;
        }
        (time / self.duration * self.chunks.len() as f64).floor() as i64
    }

    pub fn time_of(&self, index: usize) -> f64 {
        index as f64 * self.chunk_duration()
    }

    /// Chunk indices touching `[start, end]`, clamped to the sequence.
    pub fn visible_range(&self, start: f64, end: f64) -> Option<RangeInclusive<usize>> {
        if self.chunks.is_empty() || self.duration <= 0.0 {
            return None;
        }
        let len = self.chunks.len() as f64;
        let first = (start / self.duration * len).floor().max(0.0);
        let last = (end / self.duration * len).ceil().min(len - 1.0);
        if last < first {
            return None;
        }
        Some(first as usize..=last as usize)
    }
}
