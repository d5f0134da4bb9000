// src/live/media.rs

use super::context::GRAPH_CHANNELS;
use crate::decoder::{DecodedAudio, dsp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

struct MediaShared {
    audio: Arc<DecodedAudio>,
    playing: AtomicBool,
    /// Read position in source frames, stored as f64 bits.
    position: AtomicU64,
}

impl MediaShared {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }
}

/// A playable decoded buffer with transport state, shared between the
/// control side and whichever graph is rendering it.
///
/// Clones are handles to the same element.
#[derive(Clone)]
pub struct MediaElement {
    id: ElementId,
    shared: Arc<MediaShared>,
}

impl MediaElement {
    pub fn new(audio: Arc<DecodedAudio>) -> Self {
        Self {
            id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
            shared: Arc::new(MediaShared {
                audio,
                playing: AtomicBool::new(false),
                position: AtomicU64::new(0.0f64.to_bits()),
            }),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn audio(&self) -> &Arc<DecodedAudio> {
        &self.shared.audio
    }

    pub fn duration(&self) -> f64 {
        self.shared.audio.duration_secs()
    }

    pub fn current_time(&self) -> f64 {
        let rate = self.shared.audio.sample_rate.max(1) as f64;
        self.shared.position() / rate
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    pub fn ended(&self) -> bool {
        self.shared.position() >= self.shared.audio.frames() as f64
    }

    /// Start playback. A finished element restarts from the top.
    pub fn play(&self) {
        if self.ended() {
            self.seek(0.0);
        }
        self.shared.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    /// Move the playhead, clamped to `[0, duration]`.
    pub fn seek(&self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.clamp(0.0, self.duration()) } else { 0.0 };
        let frame = seconds * self.shared.audio.sample_rate as f64;
        self.shared.position.store(frame.to_bits(), Ordering::Release);
    }

    pub(crate) fn reader(&self, output_rate: u32) -> MediaReader {
        let source_rate = self.shared.audio.sample_rate.max(1) as f64;
        MediaReader {
            shared: self.shared.clone(),
            step: source_rate / output_rate.max(1) as f64,
            frame: Vec::with_capacity(self.shared.audio.channel_count()),
        }
    }
}

impl PartialEq for MediaElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaElement")
            .field("id", &self.id)
            .field("playing", &self.is_playing())
            .field("current_time", &self.current_time())
            .finish()
    }
}

/// Audio-side view of an element: pulls stereo frames at the context rate.
pub struct MediaReader {
    shared: Arc<MediaShared>,
    step: f64,
    frame: Vec<f32>,
}

impl MediaReader {
    /// Fill an interleaved stereo block. Leaves silence when paused or past the end.
    pub fn read_into(&mut self, out: &mut [f32]) {
        if !self.shared.playing.load(Ordering::Acquire) {
            return;
        }

        let audio = &self.shared.audio;
        let total = audio.frames();
        let start_bits = self.shared.position.load(Ordering::Acquire);
        let mut pos = f64::from_bits(start_bits);

        for out_frame in out.chunks_exact_mut(GRAPH_CHANNELS) {
            let idx = pos as usize;
            if idx >= total {
                self.shared.playing.store(false, Ordering::Release);
                pos = total as f64;
                break;
            }
            self.frame.clear();
            self.frame.extend(audio.channels.iter().map(|ch| ch[idx]));
            let (l, r) = dsp::frame_to_stereo(&self.frame);
            out_frame[0] = l;
            out_frame[1] = r;
            pos += self.step;
        }

        // A seek issued during this block wins over the advanced position.
        let _ = self.shared.position.compare_exchange(
            start_bits,
            pos.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
