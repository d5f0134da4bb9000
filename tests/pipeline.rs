// tests/pipeline.rs

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use approx::assert_relative_eq;
use enhance_modules::pipeline::worker::{BatchOutcome, run_batch, transcode_with_timeout};
use enhance_modules::pipeline::{Progress, TaskId, TranscodeWorker, WorkerMessage, transcode};
use enhance_modules::settings::PaddingMode;
use enhance_modules::{AudioSource, EnhancementSettings, OutputFormat, PipelineError};

fn wav_source(samples: &[i16], rate: u32) -> AudioSource {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    AudioSource::new(cursor.into_inner(), "audio/wav")
}

fn sine(frames: usize, rate: u32, amplitude: f32) -> Vec<i16> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / rate as f32;
            ((t * 440.0 * std::f32::consts::TAU).sin() * amplitude * i16::MAX as f32) as i16
        })
        .collect()
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn run(source: &AudioSource, settings: &EnhancementSettings) -> Result<enhance_modules::EncodedResult, PipelineError> {
    let cancel = AtomicBool::new(false);
    transcode(source, settings, &cancel, &mut |_| {})
}

#[test]
fn ten_seconds_mono_passthrough_is_byte_exact() {
    let source = wav_source(&sine(441_000, 44_100, 0.5), 44_100);
    let settings = EnhancementSettings {
        padding: PaddingMode::ReportOnly,
        ..EnhancementSettings::passthrough(44_100)
    };
    let result = run(&source, &settings).unwrap();

    assert_eq!(result.bytes.len(), 44 + 10 * 44_100 * 2);
    assert_eq!(result.bits_per_sample, 16);
    assert_eq!(result.mime_type, "audio/wav");

    let b = &result.bytes;
    assert_eq!(&b[0..4], b"RIFF");
    assert_eq!(le_u32(b, 4) as usize, b.len() - 8);
    assert_eq!(&b[8..16], b"WAVEfmt ");
    assert_eq!(le_u32(b, 16), 16);
    assert_eq!(le_u16(b, 20), 1);
    assert_eq!(le_u16(b, 22), 1);
    assert_eq!(le_u32(b, 24), 44_100);
    assert_eq!(le_u32(b, 28), 44_100 * 2);
    assert_eq!(le_u16(b, 32), 2);
    assert_eq!(le_u16(b, 34), 16);
    assert_eq!(&b[36..40], b"data");
    assert_eq!(le_u32(b, 40) as usize, 441_000 * 2);
}

#[test]
fn padding_reaches_the_estimate_and_keeps_the_payload() {
    let source = wav_source(&sine(8_000, 8_000, 0.3), 8_000);
    let padded = run(&source, &EnhancementSettings::passthrough(8_000)).unwrap();
    let reported = run(
        &source,
        &EnhancementSettings {
            padding: PaddingMode::ReportOnly,
            ..EnhancementSettings::passthrough(8_000)
        },
    )
    .unwrap();

    // 320 kbps over the 128 baseline, times 2.2 for WAV, capped at 4.
    assert_relative_eq!(padded.quality_multiplier, 4.0);
    assert_eq!(padded.payload_len, 44 + 16_000);
    assert_eq!(padded.enhanced_size, 4 * padded.payload_len);
    assert_eq!(padded.bytes.len(), padded.enhanced_size);
    assert_eq!(padded.payload(), reported.bytes.as_slice());
    assert_eq!(reported.enhanced_size, padded.enhanced_size);
    assert_eq!(reported.filler_len(), 0);
}

#[test]
fn compression_pulls_loud_samples_toward_the_knee() {
    let samples: Vec<i16> = vec![0, 9_830, -9_830, 29_491, -29_491, i16::MAX];
    let source = wav_source(&samples, 8_000);
    let mut settings = EnhancementSettings {
        padding: PaddingMode::ReportOnly,
        ..EnhancementSettings::passthrough(8_000)
    };
    settings.compression.enabled = true;
    settings.compression.ratio = 4.0;

    let result = run(&source, &settings).unwrap();
    let out: Vec<f32> = result.payload()[44..]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect();
    let input: Vec<f32> = samples.iter().map(|&s| s as f32 / 32_768.0).collect();

    for (x, y) in input.iter().zip(&out) {
        assert!(y.abs() <= 1.0);
        if x.abs() > 0.7 {
            let expected = 0.7 + (x.abs() - 0.7) / 4.0;
            assert!((y.abs() - expected).abs() < 1e-3, "{x} -> {y}, expected {expected}");
            assert_eq!(x.signum(), y.signum());
        } else {
            assert!((x - y).abs() < 1e-3);
        }
    }
}

#[test]
fn resampling_changes_length_and_rate() {
    let source = wav_source(&sine(4_000, 8_000, 0.2), 8_000);
    let settings = EnhancementSettings {
        padding: PaddingMode::ReportOnly,
        ..EnhancementSettings::passthrough(16_000)
    };
    let result = run(&source, &settings).unwrap();
    assert_eq!(result.sample_rate, 16_000);
    assert_eq!(result.payload_len, 44 + 8_000 * 2);
    assert!(result.quality_multiplier >= 2.0);
}

#[test]
fn progress_labels_follow_the_stages() {
    let source = wav_source(&sine(8_000, 8_000, 0.2), 8_000);
    let cancel = AtomicBool::new(false);
    let mut seen: Vec<Progress> = Vec::new();
    transcode(&source, &EnhancementSettings::passthrough(8_000), &cancel, &mut |p| seen.push(p)).unwrap();

    let labels: Vec<&str> = seen.iter().map(|p| p.stage.as_str()).collect();
    assert_eq!(labels.first(), Some(&"Decoding audio..."));
    assert!(labels.contains(&"Processing channel 1/1..."));
    assert!(labels.contains(&"Encoding audio..."));
    assert_eq!(labels.last(), Some(&"Complete"));
    assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
}

#[test]
fn cancelled_run_reports_cancelled() {
    let source = wav_source(&sine(8_000, 8_000, 0.2), 8_000);
    let cancel = AtomicBool::new(true);
    let err = transcode(&source, &EnhancementSettings::passthrough(8_000), &cancel, &mut |_| {}).unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
}

#[test]
fn mime_follows_requested_format() {
    let source = wav_source(&sine(800, 8_000, 0.2), 8_000);
    let settings = EnhancementSettings {
        output_format: OutputFormat::Mp3,
        ..EnhancementSettings::passthrough(8_000)
    };
    assert_eq!(run(&source, &settings).unwrap().mime_type, "audio/mpeg");
}

#[test]
fn worker_reports_completion_metadata() {
    let source = wav_source(&sine(8_000, 8_000, 0.2), 8_000);
    let original = source.byte_len();
    let worker = TranscodeWorker::spawn(TaskId(7), source, EnhancementSettings::passthrough(8_000));
    match worker.wait(|_| {}) {
        WorkerMessage::Complete {
            task_id,
            original_size,
            enhanced_size,
            result,
            ..
        } => {
            assert_eq!(task_id, TaskId(7));
            assert_eq!(original_size, original);
            assert_eq!(enhanced_size, result.bytes.len());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn batch_continues_after_a_decode_error() {
    let good = wav_source(&sine(800, 8_000, 0.2), 8_000);
    let bad = AudioSource::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8], "audio/wav");
    let mut terminal = Vec::new();

    let outcomes = run_batch(
        vec![good.clone(), bad, good],
        &EnhancementSettings::passthrough(8_000),
        |msg| {
            if msg.is_terminal() {
                terminal.push(msg.task_id());
            }
        },
    );

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_done());
    assert!(matches!(outcomes[1], BatchOutcome::Failed(_)));
    assert!(outcomes[2].is_done());
    assert_eq!(terminal, vec![TaskId(0), TaskId(1), TaskId(2)]);
}

#[tokio::test]
async fn timeout_wrapper_passes_fast_runs_through() {
    let source = wav_source(&sine(800, 8_000, 0.2), 8_000);
    let result = transcode_with_timeout(source, EnhancementSettings::passthrough(8_000), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(result.sample_rate, 8_000);
}

#[tokio::test]
async fn timeout_wrapper_gives_up_on_slow_runs() {
    // A minute at 48 kHz upsampled to 192 kHz does not finish in a millisecond.
    let source = wav_source(&vec![1_000i16; 48_000 * 60], 48_000);
    let err = transcode_with_timeout(source, EnhancementSettings::passthrough(192_000), Duration::from_millis(1))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TimedOut(1)));
}
