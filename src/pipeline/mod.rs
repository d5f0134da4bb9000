// src/pipeline/mod.rs

pub mod encode;
pub mod enhance;
pub mod estimate;
pub mod worker;

use crate::decoder::{AudioSource, resample};
use crate::error::PipelineError;
use crate::settings::{EnhancementSettings, OutputFormat, PaddingMode};
use enhance::{CHUNK_SIZE, EnhancementChain, YIELD_EVERY_CHUNKS};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

pub use worker::{TaskId, TranscodeWorker, WorkerMessage};

/// Progress sub-ranges of the whole run, in percent.
pub mod stages {
    pub const DECODE_START: f32 = 0.0;
    pub const DECODE_END: f32 = 25.0;
    pub const PROCESS_END: f32 = 65.0;
    pub const ENCODE_END: f32 = 90.0;
    pub const DONE: f32 = 100.0;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: f32,
    pub stage: String,
}

impl Progress {
    pub fn new(percent: f32, stage: impl Into<String>) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            stage: stage.into(),
        }
    }
}

/// Encoded output plus the quality model's size estimate.
///
/// `bytes` always starts with the genuine WAV payload (`payload_len` bytes).
/// Under [`PaddingMode::Pad`] it is followed by random filler up to
/// `enhanced_size`; under [`PaddingMode::ReportOnly`] the estimate is only reported.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResult {
    pub bytes: Vec<u8>,
    pub payload_len: usize,
    pub mime_type: &'static str,
    pub enhanced_size: usize,
    pub original_size: usize,
    pub sample_rate: u32,
    pub channels: usize,
    pub bits_per_sample: u16,
    pub quality_multiplier: f64,
}

impl EncodedResult {
    pub fn declared_len(&self) -> usize {
        self.bytes.len()
    }

    /// The RIFF container without any filler.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.payload_len]
    }

    pub fn filler_len(&self) -> usize {
        self.bytes.len() - self.payload_len
    }
}

/// Run decode -> resample -> enhance -> encode -> estimate on the calling thread.
///
/// `on_progress` receives monotonically increasing percentages; `cancel` is
/// polled between chunks and aborts the run with [`PipelineError::Cancelled`].
pub fn transcode(
    source: &AudioSource,
    settings: &EnhancementSettings,
    cancel: &AtomicBool,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<EncodedResult, PipelineError> {
    if let OutputFormat::Unrecognized(name) = &settings.output_format {
        return Err(PipelineError::UnsupportedFormat(name.clone()));
    }

    // --- Decode ---
    on_progress(Progress::new(stages::DECODE_START + 10.0, "Decoding audio..."));
    let decoded = source.decode()?;
    on_progress(Progress::new(stages::DECODE_END, "Analyzing audio..."));
    check_cancel(cancel)?;

    let source_rate = decoded.sample_rate;
    let output_rate = settings.target_sample_rate;
    let channel_count = decoded.channel_count();
    let chain = EnhancementChain::from_settings(settings);

    // --- Resample + per-sample chain ---
    let mut processed = Vec::with_capacity(channel_count);
    for (ch, input) in decoded.channels.iter().enumerate() {
        let mut output = resample::resample_nearest(input, source_rate, output_rate);
        let total_chunks = output.len().div_ceil(CHUNK_SIZE);

        for (chunk_index, block) in output.chunks_mut(CHUNK_SIZE).enumerate() {
            chain.apply_in_place(block);

            let percent = enhance::channel_progress(
                stages::DECODE_END,
                stages::PROCESS_END - stages::DECODE_END,
                ch,
                channel_count,
                chunk_index,
                total_chunks,
            );
            on_progress(Progress::new(
                percent.floor(),
                format!("Processing channel {}/{}...", ch + 1, channel_count),
            ));

            if chunk_index % YIELD_EVERY_CHUNKS == 0 {
                std::thread::yield_now();
            }
            check_cancel(cancel)?;
        }
        processed.push(output);
    }
    debug!(
        "enhanced {channel_count} channels, {source_rate} Hz -> {output_rate} Hz, {} frames",
        processed.first().map_or(0, Vec::len)
    );

    // --- Encode ---
    on_progress(Progress::new(stages::PROCESS_END, "Encoding audio..."));
    let bits = encode::bit_depth_for(&settings.output_format, settings.target_bitrate);
    let mut bytes = encode::encode_wav(&processed, output_rate, bits)?;
    drop(processed);
    let payload_len = bytes.len();

    // --- Estimate ---
    on_progress(Progress::new(stages::ENCODE_END, "Finalizing..."));
    let multiplier = estimate::quality_multiplier(settings, source_rate, output_rate);
    let enhanced_size = estimate::estimated_size(payload_len, multiplier);
    match settings.padding {
        PaddingMode::Pad => estimate::pad_with_filler(&mut bytes, enhanced_size),
        PaddingMode::ReportOnly => {}
    }
    if enhanced_size < payload_len {
        warn!("size estimate {enhanced_size} is below the payload {payload_len}; payload kept whole");
    }

    on_progress(Progress::new(stages::DONE, "Complete"));
    info!(
        "transcoded {} -> {} bytes ({} payload, x{:.2}, {}-bit {})",
        source.byte_len(),
        bytes.len(),
        payload_len,
        multiplier,
        bits,
        settings.output_format.mime_type()
    );

    Ok(EncodedResult {
        bytes,
        payload_len,
        mime_type: settings.output_format.mime_type(),
        enhanced_size,
        original_size: source.byte_len(),
        sample_rate: output_rate,
        channels: channel_count,
        bits_per_sample: bits,
        quality_multiplier: multiplier,
    })
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), PipelineError> {
    if cancel.load(Ordering::Relaxed) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
