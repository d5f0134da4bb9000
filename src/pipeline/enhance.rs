// src/pipeline/enhance.rs

use crate::settings::{EnhancementSettings, db_to_linear};

pub const CHUNK_SIZE: usize = 4096;
/// Chunks processed between cooperative yields.
pub const YIELD_EVERY_CHUNKS: usize = 10;
/// Linear knee of the offline compressor. `thresholdDb` is not consulted here.
pub const COMPRESSION_THRESHOLD: f32 = 0.7;

/// The per-sample enhancement chain, with every factor precomputed.
///
/// Order: gain, coarse EQ, noise reduction, normalization, compression, clamp.
/// The EQ here is a single scalar derived from the sum of the band gains,
/// not a filter bank; true per-band filtering only happens in the live graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancementChain {
    gain: f32,
    eq: Option<f32>,
    noise_reduction: Option<f32>,
    normalization: Option<f32>,
    compression_ratio: Option<f32>,
}

impl EnhancementChain {
    pub fn from_settings(settings: &EnhancementSettings) -> Self {
        let eq = settings.eq_enabled.then(|| {
            let eq_gain = settings.eq_bands.iter().sum::<f32>() / 100.0;
            1.0 + eq_gain * 0.1
        });
        let noise_reduction = settings
            .noise_reduction
            .enabled
            .then(|| 1.0 - (settings.noise_reduction.level_percent / 100.0) * 0.1);
        let normalization = settings
            .normalization
            .enabled
            .then(|| db_to_linear(settings.normalization.target_db));
        let compression_ratio = settings
            .compression
            .enabled
            .then_some(settings.compression.ratio);

        Self {
            gain: db_to_linear(settings.gain_adjustment_db),
            eq,
            noise_reduction,
            normalization,
            compression_ratio,
        }
    }

    #[inline]
    pub fn apply(&self, sample: f32) -> f32 {
        let mut s = sample * self.gain;
        if let Some(eq) = self.eq {
            s *= eq;
        }
        if let Some(nr) = self.noise_reduction {
            s *= nr;
        }
        if let Some(norm) = self.normalization {
            s *= norm;
        }
        if let Some(ratio) = self.compression_ratio {
            s = compress_hard_knee(s, ratio);
        }
        s.clamp(-1.0, 1.0)
    }

    pub fn apply_in_place(&self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s = self.apply(*s);
        }
    }
}

/// Excess over the fixed knee is divided by `ratio`; sign is kept.
#[inline]
pub fn compress_hard_knee(sample: f32, ratio: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= COMPRESSION_THRESHOLD {
        return sample;
    }
    let compressed = COMPRESSION_THRESHOLD + (magnitude - COMPRESSION_THRESHOLD) / ratio;
    compressed.copysign(sample)
}

/// Percent reported after `chunk` of `total_chunks` on channel `channel` of `channels`,
/// inside the `[start, start + span]` sub-range.
pub fn channel_progress(
    start: f32,
    span: f32,
    channel: usize,
    channels: usize,
    chunk: usize,
    total_chunks: usize,
) -> f32 {
    let channels = channels.max(1) as f32;
    let within = (chunk + 1) as f32 / total_chunks.max(1) as f32 * span;
    start + (channel as f32 / channels) * span + within / channels
}
