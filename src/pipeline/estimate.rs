// src/pipeline/estimate.rs

use crate::settings::EnhancementSettings;
use rand::RngCore;

pub const BASELINE_BITRATE_KBPS: f64 = 128.0;
pub const MAX_QUALITY_MULTIPLIER: f64 = 4.0;

/// Size multiplier of the quality model.
///
/// Product of independent factors, capped at 4x:
/// sample-rate ratio (floor 1), bitrate over a 128 kbps baseline (floor 1),
/// a per-format factor, and the EQ / noise reduction / compression toggles.
pub fn quality_multiplier(
    settings: &EnhancementSettings,
    source_rate: u32,
    output_rate: u32,
) -> f64 {
    let mut multiplier = 1.0_f64;

    if source_rate > 0 {
        multiplier *= (output_rate as f64 / source_rate as f64).max(1.0);
    }
    multiplier *= (settings.target_bitrate as f64 / BASELINE_BITRATE_KBPS).max(1.0);
    multiplier *= settings.output_format.size_multiplier();

    if settings.eq_enabled {
        multiplier *= 1.1;
    }
    if settings.noise_reduction.enabled {
        multiplier *= 1.05;
    }
    if settings.compression.enabled {
        multiplier *= 0.95;
    }

    multiplier.min(MAX_QUALITY_MULTIPLIER)
}

/// `floor(payload_len * multiplier)`.
pub fn estimated_size(payload_len: usize, multiplier: f64) -> usize {
    (payload_len as f64 * multiplier).floor() as usize
}

/// Grow `bytes` to `target_len` with random filler. Never shrinks the payload.
///
/// The filler is not audio. Decoders stop at the RIFF/data sizes in the header,
/// so the extra bytes are trailing garbage from their point of view.
pub fn pad_with_filler(bytes: &mut Vec<u8>, target_len: usize) {
    let payload_len = bytes.len();
    if target_len <= payload_len {
        return;
    }
    bytes.resize(target_len, 0);
    rand::rng().fill_bytes(&mut bytes[payload_len..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Compression, NoiseReduction, OutputFormat};
    use approx::assert_relative_eq;

    fn base() -> EnhancementSettings {
        EnhancementSettings {
            target_bitrate: 128,
            output_format: OutputFormat::Mp3,
            eq_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn neutral_settings_give_one() {
        assert_relative_eq!(quality_multiplier(&base(), 44_100, 44_100), 1.0);
    }

    #[test]
    fn downsampling_and_low_bitrate_are_floored() {
        let s = EnhancementSettings { target_bitrate: 64, ..base() };
        assert_relative_eq!(quality_multiplier(&s, 48_000, 22_050), 1.0);
    }

    #[test]
    fn factors_multiply() {
        let s = EnhancementSettings {
            target_bitrate: 192,
            output_format: OutputFormat::Flac,
            eq_enabled: true,
            noise_reduction: NoiseReduction { enabled: true, level_percent: 10.0 },
            ..base()
        };
        let expected: f64 = 1.5 * 1.8 * 1.1 * 1.05;
        assert_relative_eq!(quality_multiplier(&s, 44_100, 44_100), expected.min(4.0));
    }

    #[test]
    fn capped_at_four() {
        let s = EnhancementSettings {
            target_bitrate: 3000,
            output_format: OutputFormat::Wav,
            ..base()
        };
        assert_relative_eq!(quality_multiplier(&s, 22_050, 96_000), 4.0);
    }

    #[test]
    fn compression_can_drop_below_one() {
        let s = EnhancementSettings {
            compression: Compression { enabled: true, ratio: 4.0, threshold_db: -20.0 },
            ..base()
        };
        assert_relative_eq!(quality_multiplier(&s, 44_100, 44_100), 0.95);
    }

    #[test]
    fn monotonic_in_rate_and_bitrate() {
        let mut last = 0.0;
        for rate in [8_000, 22_050, 44_100, 48_000, 96_000, 192_000] {
            let m = quality_multiplier(&base(), 44_100, rate);
            assert!(m >= last);
            last = m;
        }
        let mut last = 0.0;
        for kbps in [32, 128, 192, 256, 320, 1000, 1500] {
            let s = EnhancementSettings { target_bitrate: kbps, ..base() };
            let m = quality_multiplier(&s, 44_100, 44_100);
            assert!(m >= last && m <= MAX_QUALITY_MULTIPLIER);
            last = m;
        }
    }

    #[test]
    fn padding_keeps_payload_prefix() {
        let mut bytes = vec![7u8; 100];
        pad_with_filler(&mut bytes, 250);
        assert_eq!(bytes.len(), 250);
        assert!(bytes[..100].iter().all(|&b| b == 7));

        let mut short = vec![1u8; 100];
        pad_with_filler(&mut short, 95);
        assert_eq!(short.len(), 100);
    }

    #[test]
    fn estimate_floors() {
        assert_eq!(estimated_size(1000, 1.2345), 1234);
        assert_eq!(estimated_size(3, 1.5), 4);
        assert_eq!(estimated_size(2000, 0.5), 1000);
    }
}
