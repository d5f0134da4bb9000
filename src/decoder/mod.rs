// src/decoder/mod.rs

pub mod dsp;
pub mod resample;

use crate::error::DecodeError;
use log::{debug, info};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Raw input handle: bytes plus the declared MIME type or extension.
///
/// The byte buffer is shared immutably, so handing a source to a worker
/// thread moves a pointer, not the payload.
#[derive(Debug, Clone)]
pub struct AudioSource {
    data: Arc<[u8]>,
    mime_type: String,
}

/// What is known about a source once it has been decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub byte_len: usize,
    pub mime_type: String,
    pub channels: usize,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl AudioSource {
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn info(&self, decoded: &DecodedAudio) -> SourceInfo {
        SourceInfo {
            byte_len: self.byte_len(),
            mime_type: self.mime_type.clone(),
            channels: decoded.channel_count(),
            sample_rate: decoded.sample_rate,
            duration: decoded.duration(),
        }
    }

    /// Parse the container into planar f32 channels at the source rate.
    pub fn decode(&self) -> Result<DecodedAudio, DecodeError> {
        if self.data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let cursor = Cursor::new(self.data.clone());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        if !self.mime_type.is_empty() {
            if self.mime_type.contains('/') {
                hint.mime_type(&self.mime_type);
            } else {
                hint.with_extension(self.mime_type.trim_start_matches('.'));
            }
        }

        let probed = get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let mut format = probed.format;

        let track = format.default_track().ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) | Err(SymphoniaError::IoError(_)) => {
                    skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            let spec = *decoded.spec();
            let packet_channels = spec.channels.count();

            // Lock the layout on the first non-empty packet.
            if channels.is_empty() {
                if decoded.frames() == 0 {
                    continue;
                }
                channels = vec![Vec::new(); packet_channels];
                sample_rate = spec.rate;
            } else if packet_channels != channels.len() {
                skipped_packets += 1;
                continue;
            }

            let needs_alloc = sample_buf
                .as_ref()
                .map_or(true, |b| b.capacity() < decoded.capacity());
            if needs_alloc {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                dsp::append_interleaved_to_planar(buf.samples(), &mut channels, packet_channels);
            }
        }

        if channels.is_empty() || channels[0].is_empty() || sample_rate == 0 {
            return Err(DecodeError::Corrupt("no audio frames decoded".into()));
        }
        if skipped_packets > 0 {
            debug!("decoder skipped {skipped_packets} undecodable packets");
        }

        let decoded = DecodedAudio::new(channels, sample_rate);
        info!(
            "decoded {} bytes ({}): {} ch @ {} Hz, {:.2}s",
            self.byte_len(),
            self.mime_type,
            decoded.channel_count(),
            decoded.sample_rate,
            decoded.duration_secs()
        );
        Ok(decoded)
    }
}

/// Planar floating point audio. Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = dsp::planar_len(&channels);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        Self { channels, sample_rate }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}
