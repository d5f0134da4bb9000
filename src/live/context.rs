// src/live/context.rs

use super::graph::GraphProcessor;
use crate::error::ContextError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{info, warn};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The graph always renders interleaved stereo.
pub const GRAPH_CHANNELS: usize = 2;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

impl ContextState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ContextState::Running,
            2 => ContextState::Closed,
            _ => ContextState::Suspended,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ContextState::Suspended => 0,
            ContextState::Running => 1,
            ContextState::Closed => 2,
        }
    }
}

/// Frames rendered so far. Written by the render thread, read anywhere.
#[derive(Debug)]
pub struct AudioClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds since the context first started rendering.
    pub fn current_time(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// State shared between the owning context and its render callback.
struct RenderShared {
    state: AtomicU8,
    clock: Arc<AudioClock>,
    processor: Mutex<Option<GraphProcessor>>,
}

impl RenderShared {
    fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fill `out` (interleaved stereo). Silence unless running with a graph attached.
    fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        if self.state() != ContextState::Running {
            return;
        }
        let frames = out.len() / GRAPH_CHANNELS;
        let now = self.clock.current_time();

        // try_lock: a control-thread swap must never stall the device callback.
        if let Ok(mut slot) = self.processor.try_lock() {
            if let Some(processor) = slot.as_mut() {
                processor.render(out, now);
            }
        }
        self.clock.advance(frames as u64);
    }
}

/// An explicitly owned audio context.
///
/// Starts `Suspended`. It can only be resumed after [`AudioContext::grant_user_activation`],
/// mirroring the autoplay rule that audio must start from a user gesture.
/// Each player owns its own context; there is no process-wide instance.
pub struct AudioContext {
    id: ContextId,
    shared: Arc<RenderShared>,
    user_activated: bool,
    stream: Option<Stream>,
}

impl AudioContext {
    /// An offline context, rendered by calling [`AudioContext::render`].
    pub fn new(sample_rate: u32) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            shared: Arc::new(RenderShared {
                state: AtomicU8::new(ContextState::Suspended.as_u8()),
                clock: Arc::new(AudioClock::new(sample_rate)),
                processor: Mutex::new(None),
            }),
            user_activated: false,
            stream: None,
        }
    }

    /// A context bound to the default output device, running at the device rate.
    pub fn with_output_device() -> Result<Self, ContextError> {
        let output = setup_output_device()?;
        let mut ctx = Self::new(output.sample_rate);

        let shared = ctx.shared.clone();
        let stream = match output.sample_format {
            SampleFormat::F32 => build_stream::<f32>(&output, shared)?,
            SampleFormat::I16 => build_stream::<i16>(&output, shared)?,
            SampleFormat::U16 => build_stream::<u16>(&output, shared)?,
            other => {
                return Err(ContextError::Stream(format!("unsupported sample format {other:?}")));
            }
        };
        // The device callback runs from here on; it renders silence until resumed.
        stream.play().map_err(|e| ContextError::Stream(e.to_string()))?;
        ctx.stream = Some(stream);
        Ok(ctx)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.shared.state()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.clock.sample_rate()
    }

    pub fn clock(&self) -> Arc<AudioClock> {
        self.shared.clock.clone()
    }

    pub fn current_time(&self) -> f64 {
        self.shared.clock.current_time()
    }

    pub fn has_output_device(&self) -> bool {
        self.stream.is_some()
    }

    /// Record that a user gesture happened. Required before the first resume.
    pub fn grant_user_activation(&mut self) {
        self.user_activated = true;
    }

    pub fn resume(&mut self) -> Result<(), ContextError> {
        match self.state() {
            ContextState::Closed => Err(ContextError::Closed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                if !self.user_activated {
                    return Err(ContextError::ActivationRequired);
                }
                self.set_state(ContextState::Running);
                info!("audio context {} running", self.id.0);
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) -> Result<(), ContextError> {
        match self.state() {
            ContextState::Closed => Err(ContextError::Closed),
            _ => {
                self.set_state(ContextState::Suspended);
                Ok(())
            }
        }
    }

    /// Disconnect the graph and release the device. Idempotent.
    pub fn close(&mut self) {
        if self.state() == ContextState::Closed {
            return;
        }
        self.set_state(ContextState::Closed);
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
        self.detach();
        info!("audio context {} closed", self.id.0);
    }

    /// Install the graph the context renders. Replaces any previous one.
    pub(crate) fn attach(&self, processor: GraphProcessor) -> Result<(), ContextError> {
        if self.state() == ContextState::Closed {
            return Err(ContextError::Closed);
        }
        let mut slot = self
            .shared
            .processor
            .lock()
            .map_err(|_| ContextError::Stream("render state poisoned".into()))?;
        *slot = Some(processor);
        Ok(())
    }

    pub(crate) fn detach(&self) {
        if let Ok(mut slot) = self.shared.processor.lock() {
            slot.take();
        }
    }

    /// Render `out` (interleaved stereo) on the calling thread.
    /// Used for offline contexts; device-bound contexts render from the device callback.
    pub fn render(&self, out: &mut [f32]) {
        self.shared.render(out);
    }

    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * GRAPH_CHANNELS];
        self.render(&mut out);
        out
    }

    fn set_state(&self, state: ContextState) {
        self.shared.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}

struct OutputDevice {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    channels: usize,
    sample_rate: u32,
}

fn setup_output_device() -> Result<OutputDevice, ContextError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(ContextError::NoOutputDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| ContextError::Stream(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    info!("output device: {channels} channels @ {sample_rate} Hz ({sample_format:?})");

    Ok(OutputDevice {
        device,
        config,
        sample_format,
        channels,
        sample_rate,
    })
}

/// Device stream that renders the stereo graph and maps it onto the device layout:
/// mono devices get the L/R average, wider devices get L/R on the first two
/// channels and silence elsewhere.
fn build_stream<T>(output: &OutputDevice, shared: Arc<RenderShared>) -> Result<Stream, ContextError>
where
    T: SizedSample + FromSample<f32>,
{
    let device_channels = output.channels.max(1);
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    output
        .device
        .build_output_stream(
            &output.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / device_channels;
                if scratch.len() != frames * GRAPH_CHANNELS {
                    scratch.resize(frames * GRAPH_CHANNELS, 0.0);
                }
                shared.render(&mut scratch);

                for (frame, lr) in data
                    .chunks_mut(device_channels)
                    .zip(scratch.chunks_exact(GRAPH_CHANNELS))
                {
                    if frame.len() == 1 {
                        frame[0] = T::from_sample((lr[0] + lr[1]) * 0.5);
                        continue;
                    }
                    frame[0] = T::from_sample(lr[0]);
                    frame[1] = T::from_sample(lr[1]);
                    for sample in frame.iter_mut().skip(GRAPH_CHANNELS) {
                        *sample = T::from_sample(0.0f32);
                    }
                }
            },
            |err| warn!("output stream error: {err}"),
            None,
        )
        .map_err(|e| ContextError::Stream(e.to_string()))
}
