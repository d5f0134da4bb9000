// src/live/eq.rs

use super::context::GRAPH_CHANNELS;
use super::param::ScheduledParam;
use biquad::*;
use serde::{Deserialize, Serialize};

pub const EQ_Q: f32 = 1.0;
pub const FREQUENCIES_5: [f32; 5] = [60.0, 250.0, 1000.0, 4000.0, 12000.0];
pub const FREQUENCIES_10: [f32; 10] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqFilterType {
    Peaking,
    LowShelf,
    HighShelf,
}

/// Center frequency and shape of every band for a given band count.
///
/// Five bands are all peaking. Ten bands optionally turn the outer bands into shelves.
pub fn band_layout(count: usize, shelving_edges: bool) -> Vec<(f32, EqFilterType)> {
    let freqs: &[f32] = if count == FREQUENCIES_5.len() {
        &FREQUENCIES_5
    } else {
        &FREQUENCIES_10
    };
    let last = freqs.len() - 1;
    freqs
        .iter()
        .enumerate()
        .map(|(i, &f)| {
            let kind = match i {
                0 if shelving_edges && freqs.len() == FREQUENCIES_10.len() => EqFilterType::LowShelf,
                i if i == last && shelving_edges && freqs.len() == FREQUENCIES_10.len() => {
                    EqFilterType::HighShelf
                }
                _ => EqFilterType::Peaking,
            };
            (f, kind)
        })
        .collect()
}

const IDENTITY: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// One second-order EQ stage with a scheduled gain (dB), running on both channels.
pub struct EqStage {
    filter_type: EqFilterType,
    frequency: f32,
    sample_rate: u32,
    gain: ScheduledParam,
    applied_gain_db: f32,
    filters: [DirectForm2Transposed<f32>; GRAPH_CHANNELS],
}

impl EqStage {
    pub fn new(
        sample_rate: u32,
        frequency: f32,
        filter_type: EqFilterType,
        gain: ScheduledParam,
    ) -> Self {
        let gain_db = gain.value();
        let coeffs = coefficients(filter_type, sample_rate, frequency, gain_db);
        Self {
            filter_type,
            frequency,
            sample_rate,
            gain,
            applied_gain_db: gain_db,
            filters: [
                DirectForm2Transposed::<f32>::new(coeffs),
                DirectForm2Transposed::<f32>::new(coeffs),
            ],
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn filter_type(&self) -> EqFilterType {
        self.filter_type
    }

    pub fn gain_db(&self) -> f32 {
        self.applied_gain_db
    }

    /// Filter an interleaved stereo block in place.
    pub fn process(&mut self, block: &mut [f32], now: f64) {
        let gain_db = self.gain.advance(now);
        if gain_db != self.applied_gain_db {
            // Filter state is kept so a gain step does not click.
            let coeffs = coefficients(self.filter_type, self.sample_rate, self.frequency, gain_db);
            for filter in &mut self.filters {
                filter.update_coefficients(coeffs);
            }
            self.applied_gain_db = gain_db;
        }

        for frame in block.chunks_exact_mut(GRAPH_CHANNELS) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let out = self.filters[ch].run(*sample);
                *sample = if out.abs() < 1e-20 { 0.0 } else { out };
            }
        }
    }
}

fn coefficients(
    filter_type: EqFilterType,
    sample_rate: u32,
    frequency: f32,
    gain_db: f32,
) -> Coefficients<f32> {
    let safe_freq = frequency.clamp(20.0, (sample_rate as f32 / 2.0) - 1.0);
    let biquad_type = match filter_type {
        EqFilterType::Peaking => Type::PeakingEQ(gain_db),
        EqFilterType::LowShelf => Type::LowShelf(gain_db),
        EqFilterType::HighShelf => Type::HighShelf(gain_db),
    };
    Coefficients::<f32>::from_params(biquad_type, sample_rate.hz(), safe_freq.hz(), EQ_Q)
        .unwrap_or(IDENTITY)
}
