// tests/live_graph.rs

use std::sync::Arc;

use enhance_modules::live::eq::EqFilterType;
use enhance_modules::live::{ContextState, NodeKind};
use enhance_modules::settings::{Compression, StereoWidening};
use enhance_modules::{ContextError, DecodedAudio, EnhancementSettings, LiveGraphConfig, LiveGraphManager, MediaElement};

const RATE: u32 = 8_000;

fn tone(seconds: f64, freq: f32, amplitude: f32) -> MediaElement {
    let frames = (seconds * RATE as f64) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| (std::f32::consts::TAU * freq * i as f32 / RATE as f32).sin() * amplitude)
        .collect();
    MediaElement::new(Arc::new(DecodedAudio::new(vec![samples], RATE)))
}

fn manager() -> LiveGraphManager {
    LiveGraphManager::new(LiveGraphConfig {
        sample_rate: RATE,
        ..LiveGraphConfig::default()
    })
}

fn playing(m: &mut LiveGraphManager, el: &MediaElement, settings: &EnhancementSettings) {
    m.connect(el, settings).unwrap();
    m.grant_user_activation();
    m.play().unwrap();
}

#[test]
fn out_of_range_eq_never_reaches_the_filters() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.3);
    let wild = EnhancementSettings {
        eq_bands: vec![40.0, -40.0, 13.0, -12.5, 0.0, 6.0, f32::INFINITY, -99.0, 12.0, 1.5],
        ..EnhancementSettings::default()
    };
    m.connect(&el, &wild).unwrap();
    let gains = m.controls().unwrap().eq_gains();
    assert_eq!(gains.len(), 10);
    assert!(gains.iter().all(|g| (-12.0..=12.0).contains(g)));
    assert_eq!(&gains[..4], &[12.0, -12.0, 12.0, -12.0]);

    let flipped = EnhancementSettings {
        eq_bands: wild.eq_bands.iter().map(|g| -g).collect(),
        ..wild
    };
    m.update(&flipped);
    let gains = m.controls().unwrap().eq_gains();
    assert!(gains.iter().all(|g| (-12.0..=12.0).contains(g)));
    assert_eq!(gains[0], -12.0);
}

#[test]
fn five_band_layout_is_all_peaking() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.3);
    let settings = EnhancementSettings {
        eq_bands: vec![1.0; 5],
        ..EnhancementSettings::default()
    };
    let topo = m.connect(&el, &settings).unwrap();
    let eq: Vec<_> = topo
        .nodes()
        .iter()
        .filter_map(|n| match n {
            NodeKind::Eq { frequency, filter_type } => Some((*frequency, *filter_type)),
            _ => None,
        })
        .collect();
    assert_eq!(eq.len(), 5);
    assert!(eq.iter().all(|(_, t)| *t == EqFilterType::Peaking));
    assert_eq!(eq[0].0, 60.0);
}

#[test]
fn eq_disabled_builds_no_filter_stages() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.3);
    let topo = m.connect(&el, &EnhancementSettings::passthrough(RATE)).unwrap();
    assert_eq!(topo.eq_stage_count(), 0);
    assert_eq!(topo.nodes(), &[NodeKind::Source, NodeKind::Gain, NodeKind::Analyser, NodeKind::Destination]);
}

#[test]
fn compressor_reports_reduction_on_loud_input() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.9);
    let settings = EnhancementSettings {
        compression: Compression {
            enabled: true,
            ratio: 4.0,
            threshold_db: -24.0,
        },
        stereo_widening: StereoWidening {
            enabled: true,
            percent: 25.0,
        },
        ..EnhancementSettings::passthrough(RATE)
    };
    playing(&mut m, &el, &settings);
    m.render_frames(2_000).unwrap();
    let reduction = m.controls().unwrap().compressor_reduction.as_ref().unwrap().get();
    assert!(reduction > 6.0, "reduction {reduction}");
    assert!(m.topology().unwrap().has_widener());
}

#[test]
fn analyser_sees_the_played_tone() {
    let mut m = manager();
    let el = tone(1.0, 1_000.0, 0.5);
    playing(&mut m, &el, &EnhancementSettings::passthrough(RATE));
    m.render_frames(4_096).unwrap();

    let levels = m.levels().unwrap();
    assert!(levels.peak[0] > 0.4 && levels.peak[0] <= 0.51);

    let spectrum = m.spectrum().unwrap();
    assert_eq!(spectrum.len(), 1_024);
    let loudest = spectrum
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap();
    // 1 kHz at 8 kHz with 2048 points sits on bin 256.
    assert!((255..=257).contains(&loudest), "peak at bin {loudest}");
}

#[test]
fn playback_stops_at_the_end() {
    let mut m = manager();
    let el = tone(0.1, 440.0, 0.3);
    playing(&mut m, &el, &EnhancementSettings::passthrough(RATE));
    m.render_frames(2_000).unwrap();
    assert!(el.ended());
    assert!(!el.is_playing());
    assert!((el.current_time() - 0.1).abs() < 1e-9);
}

#[test]
fn suspended_context_renders_silence() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.5);
    m.connect(&el, &EnhancementSettings::passthrough(RATE)).unwrap();
    assert_eq!(m.play(), Err(ContextError::ActivationRequired));
    assert_eq!(m.context().unwrap().state(), ContextState::Suspended);
    let out = m.render_frames(512).unwrap();
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(el.current_time(), 0.0);
}

#[test]
fn edits_made_before_play_are_not_lost() {
    let mut m = manager();
    let el = tone(1.0, 440.0, 0.5);
    m.connect(&el, &EnhancementSettings::default()).unwrap();

    for i in 0..=100 {
        let settings = EnhancementSettings {
            eq_bands: vec![i as f32 / 20.0; 10],
            ..EnhancementSettings::default()
        };
        m.update(&settings);
        m.set_volume(1.0 - i as f32 / 200.0);
    }
    assert_eq!(m.controls().unwrap().eq_gains(), vec![5.0; 10]);
    assert_eq!(m.controls().unwrap().gain.value(), 0.5);

    m.update(&EnhancementSettings::passthrough(RATE));
    m.grant_user_activation();
    m.play().unwrap();
    let out = m.render_frames(4_000).unwrap();
    assert_eq!(m.controls().unwrap().eq_gains(), vec![0.0; 10]);

    // The audio side runs at the last volume written, not a stale queued one.
    let tail = out[out.len() - 2_000..].iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(tail > 0.24 && tail <= 0.26, "tail peak {tail}");
}
