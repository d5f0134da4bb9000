// src/live/mod.rs

pub mod analyser;
pub mod compressor;
pub mod context;
pub mod eq;
pub mod graph;
pub mod media;
pub mod nodes;
pub mod param;

pub use context::{AudioClock, AudioContext, ContextId, ContextState};
pub use graph::{GraphControls, GraphTopology, NodeKind};
pub use media::{ElementId, MediaElement};

use crate::error::ContextError;
use crate::settings::{EnhancementSettings, db_to_linear};
use analyser::{DEFAULT_FFT_SIZE, MeterLevels};
use graph::{GraphOptions, build_graph};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveGraphConfig {
    /// Rate of offline contexts. Device contexts use the device rate.
    pub sample_rate: u32,
    /// Bind new contexts to the default output device.
    pub output_device: bool,
    /// Ten-band layouts use shelves on the outer bands.
    pub shelving_edges: bool,
    pub fft_size: usize,
    pub policy: PlaybackPolicy,
}

impl Default for LiveGraphConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            output_device: false,
            shelving_edges: true,
            fft_size: DEFAULT_FFT_SIZE,
            policy: PlaybackPolicy::default(),
        }
    }
}

/// What starting one player does to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPolicy {
    /// Pause every other registered element when this one starts.
    pub exclusive_playback: bool,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            exclusive_playback: true,
        }
    }
}

/// Elements known to a page of players. Cloning shares the list.
#[derive(Debug, Clone, Default)]
pub struct PlaybackRegistry {
    elements: Arc<Mutex<Vec<MediaElement>>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, element: &MediaElement) {
        if let Ok(mut list) = self.elements.lock() {
            if !list.contains(element) {
                list.push(element.clone());
            }
        }
    }

    pub fn unregister(&self, id: ElementId) {
        if let Ok(mut list) = self.elements.lock() {
            list.retain(|e| e.id() != id);
        }
    }

    /// Pause every registered element except `keep`. Returns how many were playing.
    pub fn pause_others(&self, keep: ElementId) -> usize {
        let Ok(list) = self.elements.lock() else {
            return 0;
        };
        let mut paused = 0;
        for element in list.iter().filter(|e| e.id() != keep) {
            if element.is_playing() {
                element.pause();
                paused += 1;
            }
        }
        paused
    }

    pub fn len(&self) -> usize {
        self.elements.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ConnectedGraph {
    element: MediaElement,
    topology: GraphTopology,
    controls: GraphControls,
}

/// Owns one player's context and its monitoring graph.
///
/// The context is created on first need. Connecting the same element again
/// only updates parameters; a different element tears the old graph down first.
/// Dropping the manager disconnects the graph and closes the context.
pub struct LiveGraphManager {
    config: LiveGraphConfig,
    context: Option<AudioContext>,
    user_activated: bool,
    graph: Option<ConnectedGraph>,
    settings: EnhancementSettings,
    volume: f32,
    muted: bool,
    registry: Option<PlaybackRegistry>,
}

impl LiveGraphManager {
    pub fn new(config: LiveGraphConfig) -> Self {
        Self {
            config,
            context: None,
            user_activated: false,
            graph: None,
            settings: EnhancementSettings::default(),
            volume: 1.0,
            muted: false,
            registry: None,
        }
    }

    /// Use a caller-provided context instead of creating one lazily.
    pub fn with_context(config: LiveGraphConfig, context: AudioContext) -> Self {
        let mut manager = Self::new(config);
        manager.context = Some(context);
        manager
    }

    pub fn with_registry(mut self, registry: PlaybackRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &LiveGraphConfig {
        &self.config
    }

    /// The owned context, created on first call.
    pub fn context(&mut self) -> Result<&mut AudioContext, ContextError> {
        let needs_new = self
            .context
            .as_ref()
            .is_none_or(|c| c.state() == ContextState::Closed);
        if needs_new {
            let mut ctx = if self.config.output_device {
                AudioContext::with_output_device()?
            } else {
                AudioContext::new(self.config.sample_rate)
            };
            if self.user_activated {
                ctx.grant_user_activation();
            }
            info!("created audio context {} @ {} Hz", ctx.id().0, ctx.sample_rate());
            // A replaced context invalidates any graph built on it.
            self.graph = None;
            self.context = Some(ctx);
        }
        self.context.as_mut().ok_or(ContextError::Closed)
    }

    /// Forward a user gesture to the context, now and for contexts created later.
    pub fn grant_user_activation(&mut self) {
        self.user_activated = true;
        if let Some(ctx) = self.context.as_mut() {
            ctx.grant_user_activation();
        }
    }

    /// Connect `element` through the enhancement graph. Idempotent per (element, context).
    pub fn connect(
        &mut self,
        element: &MediaElement,
        settings: &EnhancementSettings,
    ) -> Result<&GraphTopology, ContextError> {
        let output_gain = self.output_gain_for(settings);
        let fft_size = self.config.fft_size;
        let shelving_edges = self.config.shelving_edges;
        let ctx = self.context()?;
        let context_id = ctx.id();

        let same = self
            .graph
            .as_ref()
            .is_some_and(|g| g.element == *element && g.topology.context() == context_id);

        if same {
            self.update(settings);
        } else {
            if self.graph.is_some() {
                self.disconnect();
            }
            let ctx = self.context()?;
            let options = GraphOptions {
                sample_rate: ctx.sample_rate(),
                shelving_edges,
                fft_size,
            };
            let (processor, controls, topology) =
                build_graph(element, context_id, ctx.clock(), settings, output_gain, &options);
            ctx.attach(processor)?;
            info!(
                "graph built for element {} on context {}: {} nodes",
                element.id().0,
                context_id.0,
                topology.nodes().len()
            );
            if let Some(registry) = &self.registry {
                registry.register(element);
            }
            self.settings = settings.clone();
            self.graph = Some(ConnectedGraph {
                element: element.clone(),
                topology,
                controls,
            });
        }

        self.graph
            .as_ref()
            .map(|g| &g.topology)
            .ok_or(ContextError::Closed)
    }

    /// Schedule new parameter values at the context's current time.
    ///
    /// Only parameter values change. Stages disabled at the first `connect` stay
    /// absent; `close()` and reconnect to add a compressor, widener or EQ later.
    pub fn update(&mut self, settings: &EnhancementSettings) {
        self.settings = settings.clone();
        let gain = self.output_gain_for(settings);
        if let Some(graph) = self.graph.as_mut() {
            graph.controls.apply(settings, gain);
            debug!("scheduled parameter update for element {}", graph.element.id().0);
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        self.push_gain();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.push_gain();
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Resume the context (a user gesture must have been granted), apply the
    /// playback policy, then start the element.
    pub fn play(&mut self) -> Result<(), ContextError> {
        self.context()?.resume()?;
        let Some(graph) = self.graph.as_ref() else {
            return Ok(());
        };
        if self.config.policy.exclusive_playback {
            if let Some(registry) = &self.registry {
                let paused = registry.pause_others(graph.element.id());
                if paused > 0 {
                    debug!("paused {paused} other players");
                }
            }
        }
        graph.element.play();
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(graph) = self.graph.as_ref() {
            graph.element.pause();
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        if let Some(graph) = self.graph.as_ref() {
            graph.element.seek(seconds);
        }
    }

    pub fn element(&self) -> Option<&MediaElement> {
        self.graph.as_ref().map(|g| &g.element)
    }

    pub fn topology(&self) -> Option<&GraphTopology> {
        self.graph.as_ref().map(|g| &g.topology)
    }

    pub fn controls(&self) -> Option<&GraphControls> {
        self.graph.as_ref().map(|g| &g.controls)
    }

    pub fn levels(&self) -> Option<MeterLevels> {
        self.graph.as_ref().map(|g| g.controls.analyser.levels())
    }

    /// Byte spectrum of the graph output, for bar visualizers.
    pub fn spectrum(&mut self) -> Option<Vec<u8>> {
        self.graph
            .as_mut()
            .map(|g| g.controls.analyser.byte_frequency_data())
    }

    /// Render through the owned context. For offline contexts and tests.
    pub fn render_frames(&mut self, frames: usize) -> Result<Vec<f32>, ContextError> {
        Ok(self.context()?.render_frames(frames))
    }

    /// Detach the graph from the context. The context stays open.
    pub fn disconnect(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.element.pause();
            if let Some(registry) = &self.registry {
                registry.unregister(graph.element.id());
            }
            if let Some(ctx) = self.context.as_ref() {
                ctx.detach();
            }
            info!("graph for element {} disconnected", graph.element.id().0);
        }
    }

    /// Disconnect and close the context.
    pub fn close(&mut self) {
        self.disconnect();
        if let Some(mut ctx) = self.context.take() {
            ctx.close();
        }
    }

    fn output_gain_for(&self, settings: &EnhancementSettings) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume * db_to_linear(settings.gain_adjustment_db)
        }
    }

    fn push_gain(&mut self) {
        let gain = self.output_gain_for(&self.settings);
        if let Some(graph) = self.graph.as_mut() {
            graph.controls.gain.set_value(gain);
        }
    }
}

impl Drop for LiveGraphManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedAudio;
    use crate::settings::{Compression, StereoWidening};

    fn element(seconds: f64, rate: u32) -> MediaElement {
        let frames = (seconds * rate as f64) as usize;
        let tone: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        MediaElement::new(Arc::new(DecodedAudio::new(vec![tone], rate)))
    }

    fn manager() -> LiveGraphManager {
        LiveGraphManager::new(LiveGraphConfig {
            sample_rate: 8_000,
            ..Default::default()
        })
    }

    #[test]
    fn topology_follows_toggles() {
        let mut m = manager();
        let el = element(1.0, 8_000);
        let settings = EnhancementSettings {
            compression: Compression { enabled: true, ratio: 4.0, threshold_db: -24.0 },
            ..Default::default()
        };
        let topo = m.connect(&el, &settings).unwrap().clone();
        assert_eq!(topo.eq_stage_count(), 10);
        assert!(topo.has_compressor());
        assert!(!topo.has_widener());
        assert_eq!(topo.nodes().first(), Some(&NodeKind::Source));
        assert_eq!(topo.nodes().last(), Some(&NodeKind::Destination));
        let gain_at = topo.nodes().iter().position(|n| *n == NodeKind::Gain).unwrap();
        assert_eq!(topo.nodes()[gain_at + 1], NodeKind::Analyser);
    }

    #[test]
    fn reconnecting_same_element_keeps_topology() {
        let mut m = manager();
        let el = element(1.0, 8_000);
        let first = m.connect(&el, &EnhancementSettings::default()).unwrap().clone();

        let widened = EnhancementSettings {
            stereo_widening: StereoWidening { enabled: true, percent: 50.0 },
            eq_bands: vec![3.0; 10],
            ..Default::default()
        };
        let second = m.connect(&el, &widened).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(m.controls().unwrap().eq_gains(), vec![3.0; 10]);
    }

    #[test]
    fn new_element_rebuilds() {
        let mut m = manager();
        let a = element(1.0, 8_000);
        let b = element(1.0, 8_000);
        m.connect(&a, &EnhancementSettings::default()).unwrap();
        a.play();
        let topo = m.connect(&b, &EnhancementSettings::default()).unwrap();
        assert_eq!(topo.element(), b.id());
        assert!(!a.is_playing());
    }

    #[test]
    fn play_needs_activation() {
        let mut m = manager();
        let el = element(1.0, 8_000);
        m.connect(&el, &EnhancementSettings::default()).unwrap();
        assert_eq!(m.play(), Err(ContextError::ActivationRequired));
        assert!(!el.is_playing());

        m.grant_user_activation();
        m.play().unwrap();
        assert!(el.is_playing());
        let out = m.render_frames(800).unwrap();
        assert!(out.iter().any(|&s| s.abs() > 0.1));
        assert!((el.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn mute_silences_output() {
        let mut m = manager();
        let el = element(1.0, 8_000);
        m.connect(&el, &EnhancementSettings::passthrough(8_000)).unwrap();
        m.grant_user_activation();
        m.play().unwrap();
        m.set_muted(true);
        m.render_frames(256).unwrap();
        let out = m.render_frames(256).unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(m.controls().unwrap().gain.value(), 0.0);
    }

    #[test]
    fn exclusive_playback_pauses_other_players() {
        let registry = PlaybackRegistry::new();
        let mut first = manager().with_registry(registry.clone());
        let mut second = manager().with_registry(registry.clone());
        let a = element(1.0, 8_000);
        let b = element(1.0, 8_000);
        first.connect(&a, &EnhancementSettings::default()).unwrap();
        second.connect(&b, &EnhancementSettings::default()).unwrap();
        first.grant_user_activation();
        second.grant_user_activation();

        first.play().unwrap();
        second.play().unwrap();
        assert!(!a.is_playing());
        assert!(b.is_playing());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn non_exclusive_policy_leaves_others_playing() {
        let registry = PlaybackRegistry::new();
        let config = LiveGraphConfig {
            sample_rate: 8_000,
            policy: PlaybackPolicy { exclusive_playback: false },
            ..Default::default()
        };
        let mut first = LiveGraphManager::new(config.clone()).with_registry(registry.clone());
        let mut second = LiveGraphManager::new(config).with_registry(registry);
        let a = element(1.0, 8_000);
        let b = element(1.0, 8_000);
        first.connect(&a, &EnhancementSettings::default()).unwrap();
        second.connect(&b, &EnhancementSettings::default()).unwrap();
        first.grant_user_activation();
        second.grant_user_activation();
        first.play().unwrap();
        second.play().unwrap();
        assert!(a.is_playing() && b.is_playing());
    }

    #[test]
    fn managers_own_distinct_contexts() {
        let mut a = manager();
        let mut b = manager();
        let ida = a.context().unwrap().id();
        let idb = b.context().unwrap().id();
        assert_ne!(ida, idb);
    }

    #[test]
    fn close_tears_down() {
        let mut m = manager();
        let el = element(1.0, 8_000);
        m.connect(&el, &EnhancementSettings::default()).unwrap();
        m.close();
        assert!(m.topology().is_none());
        // A fresh context is created on demand afterwards.
        assert_eq!(m.context().unwrap().state(), ContextState::Suspended);
    }
}
