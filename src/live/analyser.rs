// src/live/analyser.rs

use super::context::GRAPH_CHANNELS;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const DEFAULT_FFT_SIZE: usize = 2048;
/// dB range mapped onto 0..=255 by [`AnalyserHandle::byte_frequency_data`].
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Lock-free meter values. The tap writes, anyone reads.
#[derive(Debug, Default)]
pub struct AnalyserMeters {
    peak_l: AtomicU32,
    peak_r: AtomicU32,
    hold_l: AtomicU32,
    hold_r: AtomicU32,
    rms_l: AtomicU32,
    rms_r: AtomicU32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterLevels {
    pub peak: [f32; 2],
    pub hold: [f32; 2],
    pub rms: [f32; 2],
}

impl AnalyserMeters {
    pub fn levels(&self) -> MeterLevels {
        let load = |a: &AtomicU32| f32::from_bits(a.load(Ordering::Relaxed));
        MeterLevels {
            peak: [load(&self.peak_l), load(&self.peak_r)],
            hold: [load(&self.hold_l), load(&self.hold_r)],
            rms: [load(&self.rms_l), load(&self.rms_r)],
        }
    }
}

/// Peak-hold state, owned by the audio thread.
struct MeterState {
    decay_coeff: f32,
    stored_peak: [f32; 2],
    hold_frames: [usize; 2],
    hold_duration_frames: usize,
}

impl MeterState {
    fn new(sample_rate: f32) -> Self {
        // 300 ms falloff after a 500 ms hold.
        Self {
            decay_coeff: (-1.0 / (0.300 * sample_rate)).exp(),
            stored_peak: [0.0; 2],
            hold_frames: [0; 2],
            hold_duration_frames: (0.500 * sample_rate) as usize,
        }
    }

    fn process_block(&mut self, block: &[f32], meters: &AnalyserMeters) {
        let frames = block.len() / GRAPH_CHANNELS;
        if frames == 0 {
            return;
        }

        let mut max = [0.0_f32; 2];
        let mut sum_sq = [0.0_f32; 2];
        for frame in block.chunks_exact(GRAPH_CHANNELS) {
            for ch in 0..GRAPH_CHANNELS {
                max[ch] = max[ch].max(frame[ch].abs());
                sum_sq[ch] += frame[ch] * frame[ch];
            }
        }
        let rms = [
            (sum_sq[0] / frames as f32).sqrt(),
            (sum_sq[1] / frames as f32).sqrt(),
        ];

        let block_decay = self.decay_coeff.powf(frames as f32);
        for ch in 0..GRAPH_CHANNELS {
            if max[ch] > self.stored_peak[ch] {
                self.stored_peak[ch] = max[ch];
                self.hold_frames[ch] = self.hold_duration_frames;
            } else if self.hold_frames[ch] > 0 {
                self.hold_frames[ch] = self.hold_frames[ch].saturating_sub(frames);
            } else {
                self.stored_peak[ch] *= block_decay;
                if self.stored_peak[ch] < 1e-20 {
                    self.stored_peak[ch] = 0.0;
                }
            }
        }

        meters.peak_l.store(max[0].to_bits(), Ordering::Relaxed);
        meters.peak_r.store(max[1].to_bits(), Ordering::Relaxed);
        meters.hold_l.store(self.stored_peak[0].to_bits(), Ordering::Relaxed);
        meters.hold_r.store(self.stored_peak[1].to_bits(), Ordering::Relaxed);
        meters.rms_l.store(rms[0].to_bits(), Ordering::Relaxed);
        meters.rms_r.store(rms[1].to_bits(), Ordering::Relaxed);
    }
}

/// Create the audio-side tap and its reader.
pub fn analyser(sample_rate: u32, fft_size: usize) -> (AnalyserTap, AnalyserHandle) {
    let fft_size = fft_size.max(32).next_power_of_two();
    let meters = Arc::new(AnalyserMeters::default());
    let (producer, consumer) = HeapRb::<f32>::new(fft_size * 4).split();

    let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
    let window = (0..fft_size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
        })
        .collect();

    (
        AnalyserTap {
            meters: meters.clone(),
            state: MeterState::new(sample_rate as f32),
            producer,
        },
        AnalyserHandle {
            meters,
            consumer,
            history: vec![0.0; fft_size],
            write_pos: 0,
            fft,
            window,
            buffer: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            sample_rate,
        },
    )
}

/// Pass-through node that meters the block and forwards a mono copy to the reader.
pub struct AnalyserTap {
    meters: Arc<AnalyserMeters>,
    state: MeterState,
    producer: HeapProd<f32>,
}

impl AnalyserTap {
    pub fn process(&mut self, block: &[f32]) {
        self.state.process_block(block, &self.meters);
        for frame in block.chunks_exact(GRAPH_CHANNELS) {
            // Full ring means the reader is behind; newest samples are dropped.
            if self.producer.try_push((frame[0] + frame[1]) * 0.5).is_err() {
                break;
            }
        }
    }
}

/// Reader side: meters plus an on-demand magnitude spectrum.
pub struct AnalyserHandle {
    meters: Arc<AnalyserMeters>,
    consumer: HeapCons<f32>,
    history: Vec<f32>,
    write_pos: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    sample_rate: u32,
}

impl AnalyserHandle {
    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.history.len() / 2
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size() as f32
    }

    pub fn levels(&self) -> MeterLevels {
        self.meters.levels()
    }

    /// Most recent `fft_size` samples, oldest first.
    pub fn time_domain_data(&mut self) -> Vec<f32> {
        self.drain();
        let n = self.history.len();
        (0..n).map(|i| self.history[(self.write_pos + i) % n]).collect()
    }

    /// Hann-windowed magnitude spectrum in dBFS, `fft_size / 2` bins.
    pub fn float_frequency_data(&mut self) -> Vec<f32> {
        self.drain();
        let n = self.history.len();
        for i in 0..n {
            let s = self.history[(self.write_pos + i) % n];
            self.buffer[i] = Complex { re: s * self.window[i], im: 0.0 };
        }
        self.fft.process(&mut self.buffer);

        let scale = 2.0 / n as f32;
        self.buffer[..n / 2]
            .iter()
            .map(|c| 20.0 * (c.norm() * scale).max(1e-10).log10())
            .collect()
    }

    /// Spectrum mapped linearly from [`MIN_DECIBELS`, `MAX_DECIBELS`] onto 0..=255.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        self.float_frequency_data()
            .into_iter()
            .map(|db| {
                let t = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
                (t.clamp(0.0, 1.0) * 255.0) as u8
            })
            .collect()
    }

    fn drain(&mut self) {
        let n = self.history.len();
        while let Some(s) = self.consumer.try_pop() {
            self.history[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meters_track_peak_and_rms() {
        let (mut tap, handle) = analyser(48_000, DEFAULT_FFT_SIZE);
        let block: Vec<f32> = (0..256).flat_map(|_| [0.5, -0.25]).collect();
        tap.process(&block);
        let levels = handle.levels();
        assert_eq!(levels.peak, [0.5, 0.25]);
        assert_eq!(levels.hold, [0.5, 0.25]);
        assert!((levels.rms[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hold_survives_a_quiet_block() {
        let (mut tap, handle) = analyser(48_000, DEFAULT_FFT_SIZE);
        tap.process(&[0.8, 0.8, 0.8, 0.8]);
        tap.process(&[0.0; 512]);
        let levels = handle.levels();
        assert_eq!(levels.peak[0], 0.0);
        assert_eq!(levels.hold[0], 0.8);
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let sample_rate = 48_000;
        let (mut tap, mut handle) = analyser(sample_rate, DEFAULT_FFT_SIZE);
        // Bin 64 of a 2048-point FFT at 48 kHz is exactly 1500 Hz.
        let freq = handle.bin_frequency(64);
        let block: Vec<f32> = (0..DEFAULT_FFT_SIZE)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
                [s, s]
            })
            .collect();
        tap.process(&block);

        let spectrum = handle.float_frequency_data();
        assert_eq!(spectrum.len(), handle.frequency_bin_count());
        let loudest = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(64));

        let bytes = handle.byte_frequency_data();
        assert_eq!(bytes[64], 255);
    }
}
