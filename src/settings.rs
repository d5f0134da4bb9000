// src/settings.rs

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub const EQ_BANDS_SHORT: usize = 5;
pub const EQ_BANDS_LONG: usize = 10;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Container the pipeline is asked to produce.
///
/// Parsed leniently from its lowercase name so an unknown name survives
/// deserialization and is rejected by the pipeline instead of the JSON layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    /// Lossy-compressed.
    Mp3,
    /// Lossless-compressed.
    Flac,
    /// Uncompressed.
    Wav,
    /// Other lossy.
    Ogg,
    Unrecognized(String),
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Flac => "audio/flac",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Ogg => "audio/ogg",
            OutputFormat::Unrecognized(_) => "audio/wav",
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
            OutputFormat::Wav => "wav",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Unrecognized(name) => name.as_str(),
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, OutputFormat::Flac | OutputFormat::Wav)
    }

    /// Fixed size factor used by the quality model.
    pub fn size_multiplier(&self) -> f64 {
        match self {
            OutputFormat::Flac => 1.8,
            OutputFormat::Wav => 2.2,
            _ => 1.0,
        }
    }
}

impl From<String> for OutputFormat {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "mp3" => OutputFormat::Mp3,
            "flac" => OutputFormat::Flac,
            "wav" => OutputFormat::Wav,
            "ogg" => OutputFormat::Ogg,
            _ => OutputFormat::Unrecognized(name),
        }
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.extension().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseReduction {
    pub enabled: bool,
    pub level_percent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalization {
    pub enabled: bool,
    pub target_db: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compression {
    pub enabled: bool,
    pub ratio: f32,
    /// Used by the live compressor only; the offline chain uses a fixed 0.7 linear knee.
    pub threshold_db: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StereoWidening {
    pub enabled: bool,
    pub percent: f32,
}

/// Whether the estimated size is physically reached with filler bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaddingMode {
    #[default]
    Pad,
    ReportOnly,
}

/// Flat settings record shared by the offline pipeline and the live graph.
///
/// Ranges (enforced only by [`EnhancementSettings::validated`]):
/// - `gain_adjustment_db`, every `eq_bands` entry: -12..=12 dB
/// - `level_percent`, `percent`: 0..=100
/// - `ratio`: >= 1
///
/// Everything downstream of `validated()` trusts these ranges and does not
/// re-check them, apart from the live graph's parameter handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancementSettings {
    pub target_sample_rate: u32,
    /// kbps
    pub target_bitrate: u32,
    pub output_format: OutputFormat,
    pub gain_adjustment_db: f32,
    pub eq_enabled: bool,
    pub eq_bands: Vec<f32>,
    pub noise_reduction: NoiseReduction,
    pub normalization: Normalization,
    pub compression: Compression,
    pub stereo_widening: StereoWidening,
    pub padding: PaddingMode,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: 44_100,
            target_bitrate: 320,
            output_format: OutputFormat::Wav,
            gain_adjustment_db: 0.0,
            eq_enabled: true,
            eq_bands: vec![0.0; EQ_BANDS_LONG],
            noise_reduction: NoiseReduction { enabled: false, level_percent: 50.0 },
            normalization: Normalization { enabled: false, target_db: -1.0 },
            compression: Compression { enabled: false, ratio: 4.0, threshold_db: -24.0 },
            stereo_widening: StereoWidening { enabled: false, percent: 25.0 },
            padding: PaddingMode::Pad,
        }
    }
}

impl EnhancementSettings {
    /// Plain settings: nothing enabled, output matches the given rate.
    pub fn passthrough(sample_rate: u32) -> Self {
        Self {
            target_sample_rate: sample_rate,
            eq_enabled: false,
            ..Default::default()
        }
    }

    /// The one place where user input is clamped into the documented ranges.
    pub fn validated(mut self) -> Self {
        self.target_sample_rate = self.target_sample_rate.clamp(8_000, 192_000);
        self.target_bitrate = self.target_bitrate.clamp(8, 4_000);
        self.gain_adjustment_db = clamp_db(self.gain_adjustment_db);

        if self.eq_bands.len() != EQ_BANDS_SHORT && self.eq_bands.len() != EQ_BANDS_LONG {
            self.eq_bands.resize(EQ_BANDS_LONG, 0.0);
        }
        for band in &mut self.eq_bands {
            *band = clamp_db(*band);
        }

        self.noise_reduction.level_percent = clamp_percent(self.noise_reduction.level_percent);
        self.normalization.target_db = clamp_db(self.normalization.target_db);
        self.compression.ratio = if self.compression.ratio.is_finite() {
            self.compression.ratio.clamp(1.0, 20.0)
        } else {
            1.0
        };
        self.compression.threshold_db = if self.compression.threshold_db.is_finite() {
            self.compression.threshold_db.clamp(-100.0, 0.0)
        } else {
            -24.0
        };
        self.stereo_widening.percent = clamp_percent(self.stereo_widening.percent);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        Ok(settings.validated())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let settings: Self = serde_json::from_reader(reader)?;
        Ok(settings.validated())
    }

    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn clamp_db(db: f32) -> f32 {
    if db.is_finite() { db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB) } else { 0.0 }
}

fn clamp_percent(p: f32) -> f32 {
    if p.is_finite() { p.clamp(0.0, 100.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let s = EnhancementSettings::from_json(r#"{"targetSampleRate": 48000, "outputFormat": "flac"}"#)
            .unwrap();
        assert_eq!(s.target_sample_rate, 48_000);
        assert_eq!(s.output_format, OutputFormat::Flac);
        assert_eq!(s.eq_bands.len(), EQ_BANDS_LONG);
        assert_eq!(s.target_bitrate, 320);
    }

    #[test]
    fn unknown_format_survives_parsing() {
        let s = EnhancementSettings::from_json(r#"{"outputFormat": "aiff"}"#).unwrap();
        assert_eq!(s.output_format, OutputFormat::Unrecognized("aiff".into()));
        assert_eq!(s.output_format.mime_type(), "audio/wav");
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(OutputFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Flac.mime_type(), "audio/flac");
        assert_eq!(OutputFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(OutputFormat::Ogg.mime_type(), "audio/ogg");
    }

    #[test]
    fn validated_clamps_ranges() {
        let s = EnhancementSettings {
            gain_adjustment_db: 40.0,
            eq_bands: vec![20.0, -20.0, 3.0, 0.0, f32::NAN],
            noise_reduction: NoiseReduction { enabled: true, level_percent: 150.0 },
            compression: Compression { enabled: true, ratio: 0.5, threshold_db: -24.0 },
            ..Default::default()
        }
        .validated();

        assert_eq!(s.gain_adjustment_db, 12.0);
        assert_eq!(s.eq_bands, vec![12.0, -12.0, 3.0, 0.0, 0.0]);
        assert_eq!(s.noise_reduction.level_percent, 100.0);
        assert_eq!(s.compression.ratio, 1.0);
    }

    #[test]
    fn odd_band_count_is_normalized_to_ten() {
        let s = EnhancementSettings { eq_bands: vec![1.0; 7], ..Default::default() }.validated();
        assert_eq!(s.eq_bands.len(), EQ_BANDS_LONG);
        assert_eq!(&s.eq_bands[..7], &[1.0; 7]);
    }

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let original = EnhancementSettings {
            output_format: OutputFormat::Ogg,
            gain_adjustment_db: -3.0,
            ..Default::default()
        };
        original.save_to_disk(&path).unwrap();
        let loaded = EnhancementSettings::load_from_disk(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
