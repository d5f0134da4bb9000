// src/pipeline/encode.rs

use crate::error::EncodeError;
use crate::settings::OutputFormat;

pub const WAV_HEADER_LEN: usize = 44;

/// Bit depth used for a given output format and bitrate (kbps).
/// Lossless targets scale with bitrate, everything else is 16-bit.
pub fn bit_depth_for(format: &OutputFormat, bitrate_kbps: u32) -> u16 {
    if format.is_lossless() {
        if bitrate_kbps >= 1500 {
            32
        } else if bitrate_kbps >= 1000 {
            24
        } else {
            16
        }
    } else {
        16
    }
}

/// The fixed 44-byte RIFF/WAVE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    pub fn new(
        channels: usize,
        sample_rate: u32,
        bits_per_sample: u16,
        frames: usize,
    ) -> Result<Self, EncodeError> {
        if !matches!(bits_per_sample, 16 | 24 | 32) {
            return Err(EncodeError::BitDepth(bits_per_sample));
        }
        let channels_u16 =
            u16::try_from(channels).map_err(|_| EncodeError::Channels(channels))?;
        if channels_u16 == 0 {
            return Err(EncodeError::Channels(channels));
        }

        let block_align = channels as u64 * (bits_per_sample as u64 / 8);
        let data_len = frames as u64 * block_align;
        let file_len = data_len + WAV_HEADER_LEN as u64;
        if file_len - 8 > u32::MAX as u64 {
            return Err(EncodeError::TooLarge(file_len));
        }

        Ok(Self {
            channels: channels_u16,
            sample_rate,
            bits_per_sample,
            data_len: data_len as u32,
        })
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bytes_per_sample()
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn file_len(&self) -> usize {
        WAV_HEADER_LEN + self.data_len as usize
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let riff_len = (self.file_len() - 8) as u32;
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&riff_len.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        // Format code stays 1 (PCM) even for the 32-bit float body.
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate().to_le_bytes());
        out.extend_from_slice(&self.block_align().to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&self.data_len.to_le_bytes());
    }
}

/// Header + interleaved samples. Each sample is clamped to [-1, 1] before conversion.
pub fn encode_wav(
    channels: &[Vec<f32>],
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<Vec<u8>, EncodeError> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    let header = WavHeader::new(channels.len(), sample_rate, bits_per_sample, frames)?;

    let mut out = Vec::with_capacity(header.file_len());
    header.write_to(&mut out);

    for i in 0..frames {
        for ch in channels {
            let s = ch[i].clamp(-1.0, 1.0);
            match bits_per_sample {
                16 => {
                    let v = (s * 32767.0) as i16;
                    out.extend_from_slice(&v.to_le_bytes());
                }
                24 => {
                    let v = (s * 8_388_607.0).floor() as i32;
                    out.extend_from_slice(&v.to_le_bytes()[..3]);
                }
                _ => {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
    }

    debug_assert_eq!(out.len(), header.file_len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    #[test]
    fn bit_depth_lookup() {
        assert_eq!(bit_depth_for(&OutputFormat::Wav, 1500), 32);
        assert_eq!(bit_depth_for(&OutputFormat::Flac, 1000), 24);
        assert_eq!(bit_depth_for(&OutputFormat::Flac, 999), 16);
        assert_eq!(bit_depth_for(&OutputFormat::Mp3, 3000), 16);
        assert_eq!(bit_depth_for(&OutputFormat::Ogg, 128), 16);
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let bytes = encode_wav(&[vec![0.0; 10], vec![0.0; 10]], 48_000, 24).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 48_000);
        assert_eq!(u32_at(&bytes, 28), 48_000 * 6);
        assert_eq!(u16_at(&bytes, 32), 6);
        assert_eq!(u16_at(&bytes, 34), 24);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 10 * 2 * 3);
        assert_eq!(bytes.len(), 44 + 60);
    }

    #[test]
    fn sixteen_bit_samples_truncate_and_clamp() {
        let bytes = encode_wav(&[vec![0.5, 2.0, -2.0]], 8_000, 16).unwrap();
        let s = |i: usize| i16::from_le_bytes([bytes[44 + i * 2], bytes[45 + i * 2]]);
        assert_eq!(s(0), 16383);
        assert_eq!(s(1), 32767);
        assert_eq!(s(2), -32767);
    }

    #[test]
    fn twenty_four_bit_little_endian() {
        let bytes = encode_wav(&[vec![-1.0]], 8_000, 24).unwrap();
        // floor(-8388607) as two's complement 24-bit: 0x800001
        assert_eq!(&bytes[44..47], &[0x01, 0x00, 0x80]);
    }

    #[test]
    fn thirty_two_bit_is_float() {
        let bytes = encode_wav(&[vec![0.25]], 8_000, 32).unwrap();
        let v = f32::from_le_bytes([bytes[44], bytes[45], bytes[46], bytes[47]]);
        assert_eq!(v, 0.25);
    }

    #[test]
    fn rejects_zero_channels_and_bad_depth() {
        assert_eq!(encode_wav(&[], 8_000, 16), Err(EncodeError::Channels(0)));
        assert_eq!(encode_wav(&[vec![0.0]], 8_000, 8), Err(EncodeError::BitDepth(8)));
    }
}
