// src/main.rs

use anyhow::{Context, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use enhance_modules::pipeline::worker::{BatchOutcome, run_batch, transcode_with_timeout};
use enhance_modules::pipeline::{TaskId, TranscodeWorker, WorkerMessage};
use enhance_modules::{AudioSource, EncodedResult, EnhancementSettings};

struct Args {
    inputs: Vec<PathBuf>,
    settings: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

fn parse_args() -> Result<Args, anyhow::Error> {
    let mut args = Args {
        inputs: Vec::new(),
        settings: None,
        out_dir: None,
        timeout: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" | "-s" => args.settings = Some(it.next().context("--settings needs a path")?.into()),
            "--out-dir" | "-o" => args.out_dir = Some(it.next().context("--out-dir needs a path")?.into()),
            "--timeout" => {
                let secs: f64 = it.next().context("--timeout needs seconds")?.parse()?;
                args.timeout = Some(Duration::from_secs_f64(secs));
            }
            _ => args.inputs.push(arg.into()),
        }
    }
    if args.inputs.is_empty() {
        bail!("usage: enhance <input>... [--settings file.json] [--out-dir dir] [--timeout secs]");
    }
    Ok(args)
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let settings = match &args.settings {
        Some(path) => EnhancementSettings::load_from_disk(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => EnhancementSettings::default(),
    }
    .validated();

    let sources = args
        .inputs
        .iter()
        .map(|p| load_source(p))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(limit) = args.timeout {
        let rt = tokio::runtime::Runtime::new()?;
        for (path, source) in args.inputs.iter().zip(sources) {
            match rt.block_on(transcode_with_timeout(source, settings.clone(), limit)) {
                Ok(result) => save(path, &result, &settings, args.out_dir.as_deref())?,
                Err(e) => eprintln!("❌ {}: {e}", path.display()),
            }
        }
        return Ok(());
    }

    if sources.len() == 1 {
        let source = sources.into_iter().next().context("no input")?;
        let worker = TranscodeWorker::spawn(TaskId(0), source, settings.clone());
        match worker.wait(print_progress) {
            WorkerMessage::Complete { result, elapsed_ms, .. } => {
                println!();
                save(&args.inputs[0], &result, &settings, args.out_dir.as_deref())?;
                println!("⏱️  {elapsed_ms} ms");
            }
            WorkerMessage::Error { message, .. } => bail!("{message}"),
            WorkerMessage::Progress { .. } => bail!("worker ended without a result"),
        }
        return Ok(());
    }

    let outcomes = run_batch(sources, &settings, print_progress);
    println!();
    for (path, outcome) in args.inputs.iter().zip(outcomes) {
        match outcome {
            BatchOutcome::Done(result) => save(path, &result, &settings, args.out_dir.as_deref())?,
            BatchOutcome::Failed(message) => eprintln!("❌ {}: {message}", path.display()),
        }
    }
    Ok(())
}

fn load_source(path: &Path) -> Result<AudioSource, anyhow::Error> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    Ok(AudioSource::new(bytes, hint))
}

fn print_progress(msg: &WorkerMessage) {
    match msg {
        WorkerMessage::Progress { task_id, percent, stage } => {
            print!("\r{task_id} {percent:5.1}% {stage:<28}");
            let _ = std::io::stdout().flush();
        }
        WorkerMessage::Error { task_id, message } => {
            println!("\r{task_id} failed: {message}");
        }
        WorkerMessage::Complete { .. } => {}
    }
}

fn save(
    input: &Path,
    result: &EncodedResult,
    settings: &EnhancementSettings,
    out_dir: Option<&Path>,
) -> Result<(), anyhow::Error> {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = format!("{stem}_enhanced.{}", settings.output_format.extension());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let out = dir.join(name);
    std::fs::write(&out, &result.bytes).with_context(|| format!("writing {}", out.display()))?;
    println!(
        "💾 {} ({}, {} -> {} bytes, x{:.2})",
        out.display(),
        result.mime_type,
        result.original_size,
        result.enhanced_size,
        result.quality_multiplier
    );
    Ok(())
}
