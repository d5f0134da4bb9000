// src/waveform_main.rs

use std::fmt::Write as FmtWrite;
use std::io::{Write, stdout};
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseButton, MouseEventKind,
    },
    execute, queue,
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate, disable_raw_mode,
        enable_raw_mode,
    },
};

use enhance_modules::waveform::frame_loop::{FRAME_INTERVAL, FrameLoop};
use enhance_modules::waveform::terminal::TerminalCanvas;
use enhance_modules::waveform::timeline::LoopRegion;
use enhance_modules::{
    AudioSource, EnhancementSettings, LiveGraphConfig, LiveGraphManager, MediaElement,
    WaveformRenderer, error::ContextError, waveform::RendererConfig,
};

const SEEK_STEP: f64 = 5.0;
const WHEEL_STEP: f64 = 100.0;
const LOOP_BARS: f64 = 4.0;

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        bail!("usage: waveform_view <audio file> [renderer.json] [settings.json]");
    };
    let config: RendererConfig = match args.get(2) {
        Some(p) => serde_json::from_str(&std::fs::read_to_string(p)?)?,
        None => RendererConfig::default(),
    };
    let settings = match args.get(3) {
        Some(p) => EnhancementSettings::load_from_disk(p)?,
        None => EnhancementSettings::default(),
    };

    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let audio = Arc::new(AudioSource::new(bytes, ext).decode()?);
    let element = MediaElement::new(Arc::clone(&audio));

    let mut live = connect_live(&element, &settings)?;
    let offline = !live.context()?.has_output_device();
    let offline_frames = (live.context()?.sample_rate() as f64 * FRAME_INTERVAL.as_secs_f64()) as usize;

    let (cols, rows) = terminal::size()?;
    let wave_rows = (config.height as usize / 10).clamp(4, (rows as usize).saturating_sub(3).max(4));
    let bpm = config.bpm;

    let mut renderer = WaveformRenderer::new(config);
    renderer.set_buffer(Arc::clone(&audio));
    renderer.attach_element(Some(element.clone()));
    let seek_target = element.clone();
    renderer.set_on_seek(move |t| seek_target.seek(t));
    let renderer = Arc::new(Mutex::new(renderer));

    let status = Arc::new(Mutex::new(String::new()));

    enable_raw_mode()?;
    execute!(stdout(), EnableMouseCapture, Hide, Clear(ClearType::All))?;

    let frame_loop = start_drawing(
        Arc::clone(&renderer),
        element.clone(),
        Arc::clone(&status),
        cols as usize,
        wave_rows,
    )?;

    let result = run_input_loop(&mut live, &renderer, &element, &status, bpm, offline, offline_frames);

    frame_loop.stop();
    live.close();
    execute!(stdout(), DisableMouseCapture, Show, MoveTo(0, wave_rows as u16 + 2))?;
    disable_raw_mode()?;
    println!("\n🛑 Exiting waveform view.");
    result
}

/// Prefer the output device; fall back to a silent offline context.
fn connect_live(element: &MediaElement, settings: &EnhancementSettings) -> Result<LiveGraphManager, anyhow::Error> {
    let device = LiveGraphConfig {
        output_device: true,
        ..LiveGraphConfig::default()
    };
    let mut live = LiveGraphManager::new(device);
    match live.connect(element, settings) {
        Ok(_) => Ok(live),
        Err(e @ (ContextError::NoOutputDevice | ContextError::Stream(_))) => {
            log::warn!("no audio output ({e}), monitoring silently");
            let mut live = LiveGraphManager::new(LiveGraphConfig::default());
            live.connect(element, settings)?;
            Ok(live)
        }
        Err(e) => Err(e.into()),
    }
}

fn start_drawing(
    renderer: Arc<Mutex<WaveformRenderer>>,
    element: MediaElement,
    status: Arc<Mutex<String>>,
    cols: usize,
    rows: usize,
) -> Result<FrameLoop, anyhow::Error> {
    let mut canvas = TerminalCanvas::new(cols, rows);
    let mut buf = String::new();

    let frame_loop = FrameLoop::start(FRAME_INTERVAL, move |tick| {
        let Ok(mut r) = renderer.lock() else {
            return false;
        };
        r.poll();
        if !r.clock().is_dragging {
            r.set_current_time(element.current_time());
        }

        buf.clear();
        if r.render_frame(&mut canvas, tick.elapsed.as_secs_f64() * 1000.0) {
            canvas.write_into(&mut buf, 0);
        } else {
            let _ = write!(buf, "{}⏳ Analyzing waveform...{}", MoveTo(0, 0), Clear(ClearType::UntilNewLine));
        }

        let now = r.effective_time();
        let total = r.duration();
        let _ = write!(buf, "{}{}", MoveTo(0, rows as u16 + 1), Clear(ClearType::UntilNewLine));
        let _ = write!(
            buf,
            "🎵 {:02}:{:05.2} / {:02}:{:05.2} | zoom {:>6.1}px/s",
            (now / 60.0) as u64,
            now % 60.0,
            (total / 60.0) as u64,
            total % 60.0,
            r.clock().zoom,
        );
        if let Some(pos) = r.musical_position() {
            let _ = write!(buf, " | bar {pos}");
        }
        if let Ok(s) = status.lock() {
            let _ = write!(buf, " | {s}");
        }
        drop(r);

        let mut out = stdout();
        let _ = queue!(out, BeginSynchronizedUpdate);
        let _ = out.write_all(buf.as_bytes());
        let _ = execute!(out, EndSynchronizedUpdate);
        true
    })?;
    Ok(frame_loop)
}

fn run_input_loop(
    live: &mut LiveGraphManager,
    renderer: &Arc<Mutex<WaveformRenderer>>,
    element: &MediaElement,
    status: &Arc<Mutex<String>>,
    bpm: f64,
    offline: bool,
    offline_frames: usize,
) -> Result<(), anyhow::Error> {
    let mut loop_on = false;

    loop {
        if event::poll(FRAME_INTERVAL)? {
            match event::read()? {
                Event::Key(ev) if ev.kind == KeyEventKind::Press => {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                        break;
                    }
                    match ev.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => break,
                        KeyCode::Char(' ') => {
                            // A key press is the user gesture that unlocks audio.
                            live.grant_user_activation();
                            if element.is_playing() {
                                live.pause();
                            } else {
                                live.play()?;
                            }
                        }
                        KeyCode::Left => live.seek(element.current_time() - SEEK_STEP),
                        KeyCode::Right => live.seek(element.current_time() + SEEK_STEP),
                        KeyCode::Char('+') | KeyCode::Char('=') => with_renderer(renderer, |r| r.zoom_in()),
                        KeyCode::Char('-') => with_renderer(renderer, |r| r.zoom_out()),
                        KeyCode::Up => live.set_volume(live.volume() + 0.1),
                        KeyCode::Down => live.set_volume(live.volume() - 0.1),
                        KeyCode::Char('m') | KeyCode::Char('M') => live.set_muted(!live.is_muted()),
                        KeyCode::Char('l') | KeyCode::Char('L') => {
                            loop_on = !loop_on;
                            let start = element.current_time();
                            let bar = 240.0 / bpm.max(1.0);
                            with_renderer(renderer, |r| {
                                r.set_loop(loop_on.then_some(LoopRegion {
                                    active: true,
                                    start,
                                    end: start + LOOP_BARS * bar,
                                }))
                            });
                        }
                        _ => {}
                    }
                }
                Event::Mouse(ev) => with_renderer(renderer, |r| match ev.kind {
                    MouseEventKind::Down(MouseButton::Left) => r.on_pointer_down(ev.column as f64),
                    MouseEventKind::Drag(MouseButton::Left) => {
                        r.on_pointer_move(ev.column as f64);
                    }
                    MouseEventKind::Up(_) => r.on_pointer_up(),
                    MouseEventKind::ScrollUp => {
                        r.on_wheel(-WHEEL_STEP);
                    }
                    MouseEventKind::ScrollDown => {
                        r.on_wheel(WHEEL_STEP);
                    }
                    _ => {}
                }),
                Event::FocusLost => with_renderer(renderer, |r| r.on_pointer_leave()),
                _ => {}
            }
        }

        if offline && element.is_playing() {
            live.render_frames(offline_frames)?;
        }

        let meter = live
            .levels()
            .map(|l| format!("L {:>5.1} R {:>5.1} dB", to_db(l.peak[0]), to_db(l.peak[1])))
            .unwrap_or_default();
        let line = format!(
            "vol {:>3.0}%{} | {meter} | [SPACE] play [←/→] seek [+/-] zoom [L] loop [M] mute [Q] quit",
            live.volume() * 100.0,
            if live.is_muted() { " (muted)" } else { "" },
        );
        if let Ok(mut s) = status.lock() {
            *s = line;
        }
    }
    Ok(())
}

fn with_renderer(renderer: &Arc<Mutex<WaveformRenderer>>, f: impl FnOnce(&mut WaveformRenderer)) {
    if let Ok(mut r) = renderer.lock() {
        f(&mut r);
    }
}

fn to_db(linear: f32) -> f32 {
    if linear <= 1e-5 { -100.0 } else { 20.0 * linear.log10() }
}

