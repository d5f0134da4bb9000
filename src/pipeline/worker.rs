// src/pipeline/worker.rs

use super::{EncodedResult, Progress, transcode};
use crate::decoder::AudioSource;
use crate::error::PipelineError;
use crate::settings::EnhancementSettings;
use log::{info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a transcoding worker ever tells its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Progress {
        task_id: TaskId,
        percent: f32,
        stage: String,
    },
    Complete {
        task_id: TaskId,
        result: EncodedResult,
        original_size: usize,
        enhanced_size: usize,
        elapsed_ms: u64,
    },
    Error {
        task_id: TaskId,
        message: String,
    },
}

impl WorkerMessage {
    pub fn task_id(&self) -> TaskId {
        match self {
            WorkerMessage::Progress { task_id, .. }
            | WorkerMessage::Complete { task_id, .. }
            | WorkerMessage::Error { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Progress { .. })
    }
}

/// One transcoding run on its own thread.
///
/// The source and settings are moved in; the worker only talks back through
/// [`WorkerMessage`]s. Exactly one terminal message (`Complete` or `Error`)
/// is delivered per worker, including when the run panics or is terminated.
pub struct TranscodeWorker {
    task_id: TaskId,
    rx: Receiver<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl TranscodeWorker {
    pub fn spawn(task_id: TaskId, source: AudioSource, settings: EnhancementSettings) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_thread = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("transcode-{}", task_id.0))
            .spawn(move || run_task(task_id, source, settings, cancel_thread, tx))
            .map_err(|e| warn!("failed to spawn transcode worker {task_id}: {e}"))
            .ok();

        Self {
            task_id,
            rx,
            cancel,
            handle,
            finished: false,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Block for the next message. `None` once the terminal message has been taken.
    pub fn recv(&mut self) -> Option<WorkerMessage> {
        if self.finished {
            return None;
        }
        let msg = match self.rx.recv() {
            Ok(msg) => msg,
            Err(_) => self.lost_worker(),
        };
        self.observe(msg)
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<WorkerMessage> {
        if self.finished {
            return None;
        }
        let msg = match self.rx.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => self.lost_worker(),
        };
        self.observe(msg)
    }

    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        if self.finished {
            return None;
        }
        let msg = match self.rx.try_recv() {
            Ok(msg) => msg,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => self.lost_worker(),
        };
        self.observe(msg)
    }

    /// Drain until the terminal message and return it, forwarding progress.
    pub fn wait(mut self, mut on_progress: impl FnMut(&WorkerMessage)) -> WorkerMessage {
        loop {
            match self.recv() {
                Some(msg) if msg.is_terminal() => return msg,
                Some(msg) => on_progress(&msg),
                None => return self.lost_worker(),
            }
        }
    }

    /// Tear the worker down. The run stops at its next chunk boundary.
    pub fn terminate(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("transcode worker {} terminated", self.task_id);
    }

    fn observe(&mut self, msg: WorkerMessage) -> Option<WorkerMessage> {
        if msg.is_terminal() {
            self.finished = true;
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
        Some(msg)
    }

    fn lost_worker(&mut self) -> WorkerMessage {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        WorkerMessage::Error {
            task_id: self.task_id,
            message: "transcode worker stopped without a result".into(),
        }
    }
}

impl Drop for TranscodeWorker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_task(
    task_id: TaskId,
    source: AudioSource,
    settings: EnhancementSettings,
    cancel: Arc<AtomicBool>,
    tx: Sender<WorkerMessage>,
) {
    let started = Instant::now();
    let progress_tx = tx.clone();
    let mut last_percent = -1.0_f32;
    let mut on_progress = |p: Progress| {
        // Only forward changes; per-chunk callbacks repeat the same floor().
        if p.percent > last_percent || p.percent >= 100.0 {
            last_percent = p.percent;
            let _ = progress_tx.send(WorkerMessage::Progress {
                task_id,
                percent: p.percent,
                stage: p.stage,
            });
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        transcode(&source, &settings, &cancel, &mut on_progress)
    }));

    let msg = match outcome {
        Ok(Ok(result)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                "task {task_id} complete in {elapsed_ms} ms: {} -> {} bytes",
                result.original_size, result.enhanced_size
            );
            WorkerMessage::Complete {
                task_id,
                original_size: result.original_size,
                enhanced_size: result.enhanced_size,
                elapsed_ms,
                result,
            }
        }
        Ok(Err(e)) => {
            warn!("task {task_id} failed: {e}");
            WorkerMessage::Error {
                task_id,
                message: e.to_string(),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("task {task_id} panicked: {message}");
            WorkerMessage::Error {
                task_id,
                message: PipelineError::Internal(message).to_string(),
            }
        }
    };
    let _ = tx.send(msg);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Done(EncodedResult),
    Failed(String),
}

impl BatchOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, BatchOutcome::Done(_))
    }
}

/// Process a queue of sources one after another, each on its own worker.
///
/// A failure only marks that entry; the remaining files still run.
/// `on_event` sees every message in order, terminal ones included.
pub fn run_batch(
    sources: Vec<AudioSource>,
    settings: &EnhancementSettings,
    mut on_event: impl FnMut(&WorkerMessage),
) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(sources.len());

    for (i, source) in sources.into_iter().enumerate() {
        let task_id = TaskId(i as u32);
        let worker = TranscodeWorker::spawn(task_id, source, settings.clone());
        let terminal = worker.wait(&mut on_event);
        on_event(&terminal);

        outcomes.push(match terminal {
            WorkerMessage::Complete { result, .. } => BatchOutcome::Done(result),
            WorkerMessage::Error { message, .. } => BatchOutcome::Failed(message),
            WorkerMessage::Progress { .. } => {
                BatchOutcome::Failed("worker ended on a progress message".into())
            }
        });
    }

    let failed = outcomes.iter().filter(|o| !o.is_done()).count();
    info!("batch finished: {} ok, {failed} failed", outcomes.len() - failed);
    outcomes
}

/// Run one transcode on the blocking pool, bounded by `limit`.
///
/// On timeout the run is flagged for cancellation and [`PipelineError::TimedOut`]
/// is returned immediately; the blocking task winds down at its next chunk.
pub async fn transcode_with_timeout(
    source: AudioSource,
    settings: EnhancementSettings,
    limit: Duration,
) -> Result<EncodedResult, PipelineError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_task = cancel.clone();

    let task = tokio::task::spawn_blocking(move || {
        transcode(&source, &settings, &cancel_task, &mut |_| {})
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PipelineError::Internal(join_err.to_string())),
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            warn!("transcode exceeded {} ms, cancelling", limit.as_millis());
            Err(PipelineError::TimedOut(limit.as_millis()))
        }
    }
}
