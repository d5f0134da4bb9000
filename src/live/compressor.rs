// src/live/compressor.rs

use super::context::GRAPH_CHANNELS;
use super::param::ScheduledParam;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const ATTACK_MS: f32 = 3.0;
pub const RELEASE_MS: f32 = 250.0;

/// Gain reduction currently applied, in dB (>= 0). Readable from any thread.
#[derive(Debug, Default)]
pub struct ReductionMeter(AtomicU32);

impl ReductionMeter {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, db: f32) {
        self.0.store(db.to_bits(), Ordering::Relaxed);
    }
}

/// Stereo-linked feed-forward compressor with scheduled threshold (dB) and ratio.
/// No locks and no allocation in `process`.
pub struct CompressorNode {
    threshold_db: ScheduledParam,
    ratio: ScheduledParam,
    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
    reduction: Arc<ReductionMeter>,
}

impl CompressorNode {
    pub fn new(sample_rate: u32, threshold_db: ScheduledParam, ratio: ScheduledParam) -> Self {
        let sr = sample_rate as f32;
        Self {
            threshold_db,
            ratio,
            attack_coef: (-1.0 / (ATTACK_MS * 0.001 * sr)).exp(),
            release_coef: (-1.0 / (RELEASE_MS * 0.001 * sr)).exp(),
            envelope: 0.0,
            reduction: Arc::new(ReductionMeter::default()),
        }
    }

    pub fn reduction_meter(&self) -> Arc<ReductionMeter> {
        self.reduction.clone()
    }

    pub fn process(&mut self, block: &mut [f32], now: f64) {
        let threshold = self.threshold_db.advance(now);
        let ratio = self.ratio.advance(now).max(1.0);
        let slope = 1.0 - 1.0 / ratio;
        let mut last_reduction = 0.0;

        for frame in block.chunks_exact_mut(GRAPH_CHANNELS) {
            let input_level = frame[0].abs().max(frame[1].abs());

            let coef = if input_level > self.envelope {
                self.attack_coef
            } else {
                self.release_coef
            };
            self.envelope = coef * (self.envelope - input_level) + input_level;

            let env_db = 20.0 * self.envelope.max(1e-5).log10();
            let reduction_db = if env_db > threshold {
                (env_db - threshold) * slope
            } else {
                0.0
            };

            let gain = 10.0_f32.powf(-reduction_db / 20.0);
            frame[0] *= gain;
            frame[1] *= gain;
            last_reduction = reduction_db;
        }

        self.reduction.set(last_reduction);
    }
}
