// src/waveform/renderer.rs

use super::canvas::{Canvas, GradientStop, LineCap, LinearGradient, Paint, Rgba, Segment, Shadow, Stroke};
use super::timeline::{self, BeatGrid, LoopRegion, MusicalPosition, Viewport};
use super::{PEAK_WINDOW, PeakJob, PeakMessage, PeakReducer, PeakSequence, reduce_peaks};
use crate::decoder::DecodedAudio;
use crate::live::MediaElement;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BAR_LINE: Rgba = Rgba::new(255, 255, 255, 0.3);
const BEAT_LINE: Rgba = Rgba::new(255, 255, 255, 0.1);
const LOOP_FILL: Rgba = Rgba::new(34, 197, 94, 0.2);
const LOOP_MARKER: Rgba = Rgba::opaque(0x22, 0xc5, 0x5e);
const PLAYHEAD: Rgba = Rgba::opaque(0xef, 0x44, 0x44);

/// Share of the canvas height a full-scale peak spans.
const WAVE_HEIGHT: f64 = 0.8;
const ZOOM_STEP: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformColor {
    Cyan,
    Purple,
}

/// Gradient edge/center colors and glow for one color identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub edge: Rgba,
    pub center: Rgba,
    pub glow: Rgba,
}

impl WaveformColor {
    pub fn palette(self) -> Palette {
        match self {
            WaveformColor::Cyan => Palette {
                edge: Rgba::new(34, 211, 238, 0.2),
                center: Rgba::opaque(56, 189, 248),
                glow: Rgba::new(34, 211, 238, 0.5),
            },
            WaveformColor::Purple => Palette {
                edge: Rgba::new(168, 85, 247, 0.2),
                center: Rgba::opaque(168, 85, 247),
                glow: Rgba::new(168, 85, 247, 0.5),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    pub height: u32,
    pub color: WaveformColor,
    pub show_grid: bool,
    pub bpm: f64,
    /// Pixels per second.
    pub initial_zoom: f64,
    pub loop_region: Option<LoopRegion>,
    /// How long the background reducer may run before peaks are computed inline.
    pub analysis_timeout_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            height: 150,
            color: WaveformColor::Cyan,
            show_grid: true,
            bpm: 128.0,
            initial_zoom: 100.0,
            loop_region: None,
            analysis_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// No buffer attached.
    Idle,
    /// Peak reduction in flight.
    Analyzing,
    /// Peaks available; frames draw.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    /// Externally tracked position, seconds.
    pub current_time: f64,
    pub zoom: f64,
    pub is_dragging: bool,
}

type SeekFn = Box<dyn FnMut(f64) + Send>;

/// Scrolling waveform with a fixed center playhead.
pub struct WaveformRenderer {
    config: RendererConfig,
    state: RendererState,
    audio: Option<Arc<DecodedAudio>>,
    job: Option<PeakJob>,
    analysis_started: Instant,
    peaks: Option<PeakSequence>,
    clock: PlaybackClock,
    element: Option<MediaElement>,
    last_pointer_x: f64,
    on_seek: Option<SeekFn>,
}

impl WaveformRenderer {
    pub fn new(config: RendererConfig) -> Self {
        let zoom = config.initial_zoom.clamp(timeline::MIN_ZOOM, timeline::MAX_ZOOM);
        Self {
            config,
            state: RendererState::Idle,
            audio: None,
            job: None,
            analysis_started: Instant::now(),
            peaks: None,
            clock: PlaybackClock {
                current_time: 0.0,
                zoom,
                is_dragging: false,
            },
            element: None,
            last_pointer_x: 0.0,
            on_seek: None,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn clock(&self) -> PlaybackClock {
        self.clock
    }

    pub fn peaks(&self) -> Option<&PeakSequence> {
        self.peaks.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration_secs())
    }

    /// Attach a new buffer and start reducing it in the background.
    ///
    /// Any reduction still running for the previous buffer is abandoned.
    pub fn set_buffer(&mut self, audio: Arc<DecodedAudio>) {
        self.peaks = None;
        self.job = Some(PeakReducer::spawn_channel0(Arc::clone(&audio), PEAK_WINDOW));
        self.audio = Some(audio);
        self.analysis_started = Instant::now();
        self.state = RendererState::Analyzing;
        debug!("waveform analysis started ({:.2}s of audio)", self.duration());
    }

    pub fn clear_buffer(&mut self) {
        self.job = None;
        self.audio = None;
        self.peaks = None;
        self.state = RendererState::Idle;
    }

    /// Collect a finished reduction without blocking. Falls back to inline
    /// reduction when the job failed or ran past the analysis timeout.
    pub fn poll(&mut self) -> RendererState {
        if self.state != RendererState::Analyzing {
            return self.state;
        }
        let msg = match self.job.as_mut() {
            Some(job) => job.try_take(),
            None => Some(PeakMessage::Error {
                message: "no reduction job".into(),
            }),
        };
        match msg {
            Some(msg) => self.finish(msg),
            None if self.analysis_started.elapsed() >= self.analysis_timeout() => {
                warn!("waveform analysis timed out, computing peaks inline");
                self.fallback();
            }
            None => {}
        }
        self.state
    }

    /// Block until peaks are available or the analysis timeout passes.
    pub fn wait_ready(&mut self) -> RendererState {
        if self.state != RendererState::Analyzing {
            return self.state;
        }
        let remaining = self.analysis_timeout().saturating_sub(self.analysis_started.elapsed());
        let msg = self.job.as_mut().and_then(|job| job.wait_timeout(remaining));
        match msg {
            Some(msg) => self.finish(msg),
            None => {
                warn!("waveform analysis timed out, computing peaks inline");
                self.fallback();
            }
        }
        self.state
    }

    fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.config.analysis_timeout_ms)
    }

    fn finish(&mut self, msg: PeakMessage) {
        match msg {
            PeakMessage::Complete { peaks } => {
                self.job = None;
                self.peaks = Some(PeakSequence::new(peaks, self.duration()));
                self.state = RendererState::Ready;
                debug!("waveform ready with {} peaks", self.peaks.as_ref().map_or(0, |p| p.len()));
            }
            PeakMessage::Error { message } => {
                warn!("peak reducer failed: {message}; computing peaks inline");
                self.fallback();
            }
        }
    }

    fn fallback(&mut self) {
        self.job = None;
        let duration = self.duration();
        let samples = self.audio.as_ref().and_then(|a| a.channel(0)).unwrap_or(&[]);
        let chunks = match reduce_peaks(samples, PEAK_WINDOW) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("inline peak reduction failed: {e}");
                Vec::new()
            }
        };
        self.peaks = Some(PeakSequence::new(chunks, duration));
        self.state = RendererState::Ready;
    }

    /// Follow a media element's clock while it plays.
    pub fn attach_element(&mut self, element: Option<MediaElement>) {
        self.element = element;
    }

    pub fn set_on_seek(&mut self, on_seek: impl FnMut(f64) + Send + 'static) {
        self.on_seek = Some(Box::new(on_seek));
    }

    pub fn set_current_time(&mut self, seconds: f64) {
        self.clock.current_time = seconds;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.clock.zoom = zoom.clamp(timeline::MIN_ZOOM, timeline::MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.clock.zoom * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.clock.zoom / ZOOM_STEP);
    }

    pub fn set_loop(&mut self, region: Option<LoopRegion>) {
        self.config.loop_region = region;
    }

    pub fn set_color(&mut self, color: WaveformColor) {
        self.config.color = color;
    }

    /// The playing element's position, unless a drag is in progress.
    pub fn effective_time(&self) -> f64 {
        match &self.element {
            Some(el) if el.is_playing() && !self.clock.is_dragging => el.current_time(),
            _ => self.clock.current_time,
        }
    }

    pub fn musical_position(&self) -> Option<MusicalPosition> {
        BeatGrid::new(self.config.bpm).map(|g| g.position(self.effective_time()))
    }

    pub fn on_wheel(&mut self, delta_y: f64) -> f64 {
        self.clock.zoom = timeline::zoom_after_wheel(self.clock.zoom, delta_y);
        self.clock.zoom
    }

    pub fn on_pointer_down(&mut self, x: f64) {
        self.clock.is_dragging = true;
        self.last_pointer_x = x;
    }

    /// Scrub while dragging. Returns the new time and reports it to the seek callback.
    pub fn on_pointer_move(&mut self, x: f64) -> Option<f64> {
        if !self.clock.is_dragging {
            return None;
        }
        let delta_x = x - self.last_pointer_x;
        self.last_pointer_x = x;
        let time = timeline::time_after_drag(self.clock.current_time, delta_x, self.clock.zoom, self.duration());
        self.clock.current_time = time;
        if let Some(on_seek) = self.on_seek.as_mut() {
            on_seek(time);
        }
        Some(time)
    }

    pub fn on_pointer_up(&mut self) {
        self.clock.is_dragging = false;
    }

    pub fn on_pointer_leave(&mut self) {
        self.clock.is_dragging = false;
    }

    /// Draw one frame. Nothing is drawn until peaks are ready.
    pub fn render_frame(&self, canvas: &mut dyn Canvas, wall_ms: f64) -> bool {
        let Some(peaks) = self.peaks.as_ref().filter(|_| self.state == RendererState::Ready) else {
            return false;
        };
        let (width, height) = canvas.size();
        let h = height as f64;
        let vp = Viewport {
            width: width as f64,
            now: self.effective_time(),
            zoom: self.clock.zoom,
        };
        let (start, end) = vp.visible();

        canvas.clear();

        if let Some(grid) = BeatGrid::new(self.config.bpm).filter(|_| self.config.show_grid) {
            for line in grid.lines(start, end) {
                let x = vp.x_of(line.time) as f32;
                if line.is_bar_start {
                    canvas.stroke_path(&[Segment::vertical(x, 0.0, height)], &Stroke::solid(BAR_LINE, 1.0));
                } else {
                    let seg = Segment::vertical(x, (h * 0.2) as f32, (h * 0.8) as f32);
                    canvas.stroke_path(&[seg], &Stroke::solid(BEAT_LINE, 1.0));
                }
            }
        }

        if let Some(region) = self.config.loop_region.filter(|r| r.active) {
            let x0 = vp.x_of(region.start) as f32;
            let x1 = vp.x_of(region.end) as f32;
            let fill = LOOP_FILL.with_alpha(LoopRegion::pulse_alpha(wall_ms));
            canvas.fill_rect(x0, 0.0, x1 - x0, height, fill);
            let marker = Stroke::solid(LOOP_MARKER, 1.0).dashed(4.0, 2.0);
            canvas.stroke_path(&[Segment::vertical(x0, 0.0, height)], &marker);
            canvas.stroke_path(&[Segment::vertical(x1, 0.0, height)], &marker);
        }

        if let Some(range) = peaks.visible_range(start, end) {
            let center = h / 2.0;
            let step = peaks.chunk_duration();
            let segments: Vec<Segment> = range
                .filter_map(|i| peaks.get(i).map(|p| (i, p)))
                .map(|(i, p)| {
                    let x = vp.x_of(i as f64 * step) as f32;
                    let bar = p.amplitude() as f64 * (h * WAVE_HEIGHT);
                    Segment::vertical(x, (center - bar / 2.0) as f32, (center + bar / 2.0) as f32)
                })
                .collect();
            canvas.stroke_path(&segments, &self.wave_stroke(h));
        }

        canvas.stroke_path(&[Segment::vertical(vp.center() as f32, 0.0, height)], &Stroke::solid(PLAYHEAD, 2.0));
        true
    }

    fn wave_stroke(&self, h: f64) -> Stroke {
        let palette = self.config.color.palette();
        let center = h / 2.0;
        let gradient = LinearGradient {
            y0: (center - h / 2.0) as f32,
            y1: (center + h / 2.0) as f32,
            stops: vec![
                GradientStop { offset: 0.0, color: palette.edge },
                GradientStop { offset: 0.5, color: palette.center },
                GradientStop { offset: 1.0, color: palette.edge },
            ],
        };
        Stroke {
            paint: Paint::Gradient(gradient),
            width: (2.0f64).max(self.clock.zoom / 100.0 * 2.0) as f32,
            dash: None,
            cap: LineCap::Round,
            shadow: Some(Shadow {
                color: palette.glow,
                blur: 4.0,
            }),
        }
    }
}
