// src/live/graph.rs

use super::analyser::{AnalyserHandle, AnalyserTap, analyser};
use super::compressor::{CompressorNode, ReductionMeter};
use super::context::{AudioClock, ContextId};
use super::eq::{EqFilterType, EqStage, band_layout};
use super::media::{ElementId, MediaElement, MediaReader};
use super::nodes::{GainStage, StereoWidener};
use super::param::{ParamHandle, scheduled_param};
use crate::settings::{EnhancementSettings, MAX_GAIN_DB, db_to_linear};
use std::sync::Arc;

/// One node of a built graph, in signal order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Source,
    Eq {
        frequency: f32,
        filter_type: EqFilterType,
    },
    Compressor,
    StereoWidener,
    Gain,
    Analyser,
    Destination,
}

/// Immutable description of a connected graph.
///
/// Fixed at first connection; later settings changes only move parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphTopology {
    element: ElementId,
    context: ContextId,
    nodes: Vec<NodeKind>,
}

impl GraphTopology {
    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn nodes(&self) -> &[NodeKind] {
        &self.nodes
    }

    pub fn eq_stage_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, NodeKind::Eq { .. }))
            .count()
    }

    pub fn has_compressor(&self) -> bool {
        self.nodes.contains(&NodeKind::Compressor)
    }

    pub fn has_widener(&self) -> bool {
        self.nodes.contains(&NodeKind::StereoWidener)
    }
}

enum LiveNode {
    Eq(EqStage),
    Compressor(CompressorNode),
    Widener(StereoWidener),
    Gain(GainStage),
    Analyser(AnalyserTap),
}

impl LiveNode {
    fn process(&mut self, block: &mut [f32], now: f64) {
        match self {
            LiveNode::Eq(stage) => stage.process(block, now),
            LiveNode::Compressor(comp) => comp.process(block, now),
            LiveNode::Widener(widener) => widener.process(block, now),
            LiveNode::Gain(gain) => gain.process(block, now),
            LiveNode::Analyser(tap) => tap.process(block),
        }
    }
}

/// The render side of a graph. Runs on the audio thread.
pub struct GraphProcessor {
    source: MediaReader,
    nodes: Vec<LiveNode>,
}

impl GraphProcessor {
    pub fn render(&mut self, out: &mut [f32], now: f64) {
        self.source.read_into(out);
        for node in &mut self.nodes {
            node.process(out, now);
        }
    }
}

/// Control side of a graph: one scheduled handle per automatable value.
pub struct GraphControls {
    pub eq: Vec<ParamHandle>,
    pub compressor_threshold: Option<ParamHandle>,
    pub compressor_ratio: Option<ParamHandle>,
    pub compressor_reduction: Option<Arc<ReductionMeter>>,
    pub widener: Option<ParamHandle>,
    pub gain: ParamHandle,
    pub analyser: AnalyserHandle,
}

impl GraphControls {
    /// Gains currently scheduled on the EQ stages (dB, already clamped).
    pub fn eq_gains(&self) -> Vec<f32> {
        self.eq.iter().map(ParamHandle::value).collect()
    }

    /// Schedule every parameter from `settings` at the clock's current time.
    /// Stages absent from the topology are skipped.
    pub fn apply(&mut self, settings: &EnhancementSettings, output_gain: f32) {
        for (handle, &db) in self.eq.iter_mut().zip(&settings.eq_bands) {
            handle.set_value(db);
        }
        if let Some(h) = self.compressor_threshold.as_mut() {
            h.set_value(settings.compression.threshold_db);
        }
        if let Some(h) = self.compressor_ratio.as_mut() {
            h.set_value(settings.compression.ratio);
        }
        if let Some(h) = self.widener.as_mut() {
            h.set_value(settings.stereo_widening.percent);
        }
        self.gain.set_value(output_gain);
    }
}

pub struct GraphOptions {
    pub sample_rate: u32,
    pub shelving_edges: bool,
    pub fft_size: usize,
}

/// Largest linear output gain: unity volume at +12 dB.
pub fn max_output_gain() -> f32 {
    db_to_linear(MAX_GAIN_DB)
}

/// Build source -> [EQ...] -> [compressor] -> [widener] -> gain -> analyser -> destination.
///
/// EQ stages exist only when EQ is enabled, the compressor and widener only when
/// their toggles are on at build time.
pub fn build_graph(
    element: &MediaElement,
    context: ContextId,
    clock: Arc<AudioClock>,
    settings: &EnhancementSettings,
    output_gain: f32,
    options: &GraphOptions,
) -> (GraphProcessor, GraphControls, GraphTopology) {
    let sr = options.sample_rate;
    let mut kinds = vec![NodeKind::Source];
    let mut nodes = Vec::new();

    let mut eq = Vec::new();
    if settings.eq_enabled {
        for (i, (frequency, filter_type)) in band_layout(settings.eq_bands.len(), options.shelving_edges)
            .into_iter()
            .enumerate()
        {
            let initial = settings.eq_bands.get(i).copied().unwrap_or(0.0);
            let (handle, param) = scheduled_param(initial, -MAX_GAIN_DB, MAX_GAIN_DB, clock.clone());
            nodes.push(LiveNode::Eq(EqStage::new(sr, frequency, filter_type, param)));
            kinds.push(NodeKind::Eq { frequency, filter_type });
            eq.push(handle);
        }
    }

    let (mut compressor_threshold, mut compressor_ratio, mut compressor_reduction) = (None, None, None);
    if settings.compression.enabled {
        let (th, t) = scheduled_param(settings.compression.threshold_db, -100.0, 0.0, clock.clone());
        let (rh, r) = scheduled_param(settings.compression.ratio, 1.0, 20.0, clock.clone());
        let node = CompressorNode::new(sr, t, r);
        compressor_reduction = Some(node.reduction_meter());
        compressor_threshold = Some(th);
        compressor_ratio = Some(rh);
        nodes.push(LiveNode::Compressor(node));
        kinds.push(NodeKind::Compressor);
    }

    let mut widener = None;
    if settings.stereo_widening.enabled {
        let (h, p) = scheduled_param(settings.stereo_widening.percent, 0.0, 100.0, clock.clone());
        nodes.push(LiveNode::Widener(StereoWidener::new(p)));
        kinds.push(NodeKind::StereoWidener);
        widener = Some(h);
    }

    let (gain, gain_param) = scheduled_param(output_gain, 0.0, max_output_gain(), clock);
    nodes.push(LiveNode::Gain(GainStage::new(gain_param)));
    kinds.push(NodeKind::Gain);

    let (tap, analyser_handle) = analyser(sr, options.fft_size);
    nodes.push(LiveNode::Analyser(tap));
    kinds.push(NodeKind::Analyser);
    kinds.push(NodeKind::Destination);

    (
        GraphProcessor {
            source: element.reader(sr),
            nodes,
        },
        GraphControls {
            eq,
            compressor_threshold,
            compressor_ratio,
            compressor_reduction,
            widener,
            gain,
            analyser: analyser_handle,
        },
        GraphTopology {
            element: element.id(),
            context,
            nodes: kinds,
        },
    )
}
