// src/waveform/timeline.rs

use serde::{Deserialize, Serialize};

pub const BEATS_PER_BAR: i64 = 4;
pub const MIN_ZOOM: f64 = 10.0;
pub const MAX_ZOOM: f64 = 2000.0;

/// Maps time to x for a viewport whose center shows `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub now: f64,
    /// Pixels per second.
    pub zoom: f64,
}

impl Viewport {
    pub fn center(&self) -> f64 {
        self.width / 2.0
    }

    pub fn half_window(&self) -> f64 {
        self.center() / self.zoom
    }

    /// `[now - halfWidth/zoom, now + halfWidth/zoom]`
    pub fn visible(&self) -> (f64, f64) {
        let half = self.half_window();
        (self.now - half, self.now + half)
    }

    pub fn x_of(&self, time: f64) -> f64 {
        self.center() + (time - self.now) * self.zoom
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatLine {
    pub time: f64,
    /// Signed beat number; 0 is the first downbeat.
    pub index: i64,
    pub is_bar_start: bool,
}

/// Bar/beat position, both 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalPosition {
    pub bar: i64,
    pub beat: i64,
    /// Progress through the current beat, 0..1.
    pub fraction: f64,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.bar, self.beat)
    }
}

/// Fixed-tempo grid in 4/4, anchored at time zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub bpm: f64,
}

impl BeatGrid {
    pub fn new(bpm: f64) -> Option<Self> {
        (bpm.is_finite() && bpm > 0.0).then_some(Self { bpm })
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * BEATS_PER_BAR as f64
    }

    /// Every beat from `floor(start)` to `ceil(end)` in beat units. Bars every fourth beat.
    pub fn lines(&self, start: f64, end: f64) -> Vec<BeatLine> {
        let spb = self.seconds_per_beat();
        let first = (start / spb).floor() as i64;
        let last = (end / spb).ceil() as i64;
        (first..=last)
            .map(|index| BeatLine {
                time: index as f64 * spb,
                index,
                is_bar_start: index.rem_euclid(BEATS_PER_BAR) == 0,
            })
            .collect()
    }

    pub fn position(&self, time: f64) -> MusicalPosition {
        let total_beats = time / self.seconds_per_beat();
        let beat_index = total_beats.floor() as i64;
        MusicalPosition {
            bar: beat_index.div_euclid(BEATS_PER_BAR) + 1,
            beat: beat_index.rem_euclid(BEATS_PER_BAR) + 1,
            fraction: total_beats - total_beats.floor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub active: bool,
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    /// Overlay opacity at wall-clock `millis`, pulsing between 0.05 and 0.35.
    pub fn pulse_alpha(millis: f64) -> f32 {
        (0.2 + 0.15 * (millis / 150.0).sin()) as f32
    }
}

/// Zoom after a wheel event: `zoom - delta_y * 0.5`, clamped to `[10, 2000]`.
pub fn zoom_after_wheel(zoom: f64, delta_y: f64) -> f64 {
    if !delta_y.is_finite() {
        return zoom;
    }
    (zoom - delta_y * 0.5).clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Seek target after dragging `delta_x` pixels; dragging left moves forward.
pub fn time_after_drag(time: f64, delta_x: f64, zoom: f64, duration: f64) -> f64 {
    (time - delta_x / zoom).clamp(0.0, duration.max(0.0))
}
