// src/waveform/worker.rs

use super::{PeakChunk, reduce_peaks};
use crate::decoder::DecodedAudio;
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The single message a peak job sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum PeakMessage {
    Complete { peaks: Vec<PeakChunk> },
    Error { message: String },
}

/// Spawns peak reduction off the calling thread.
pub struct PeakReducer;

impl PeakReducer {
    /// Reduce an owned channel buffer. The buffer moves into the job.
    pub fn spawn(samples: Vec<f32>, window: usize) -> PeakJob {
        spawn_job(move || reduce_peaks(&samples, window))
    }

    /// Reduce channel 0 of a shared decoded buffer without copying it.
    pub fn spawn_channel0(audio: Arc<DecodedAudio>, window: usize) -> PeakJob {
        spawn_job(move || reduce_peaks(audio.channel(0).unwrap_or(&[]), window))
    }
}

fn spawn_job<F>(job: F) -> PeakJob
where
    F: FnOnce() -> Result<Vec<PeakChunk>, crate::error::AnalysisError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("peak-reducer".into())
        .spawn(move || {
            let msg = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(peaks)) => {
                    debug!("peak reduction produced {} chunks", peaks.len());
                    PeakMessage::Complete { peaks }
                }
                Ok(Err(e)) => PeakMessage::Error { message: e.to_string() },
                Err(_) => PeakMessage::Error {
                    message: "peak reducer panicked".into(),
                },
            };
            let _ = tx.send(msg);
        })
        .map_err(|e| warn!("failed to spawn peak reducer: {e}"))
        .ok();

    PeakJob { rx, handle }
}

/// Handle to a running reduction.
pub struct PeakJob {
    rx: Receiver<PeakMessage>,
    handle: Option<JoinHandle<()>>,
}

impl PeakJob {
    /// Non-blocking poll. A job that died without replying reports an error.
    pub fn try_take(&mut self) -> Option<PeakMessage> {
        match self.rx.try_recv() {
            Ok(msg) => {
                self.join();
                Some(msg)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.lost()),
        }
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<PeakMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                self.join();
                Some(msg)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.lost()),
        }
    }

    pub fn wait(mut self) -> PeakMessage {
        match self.rx.recv() {
            Ok(msg) => {
                self.join();
                msg
            }
            Err(_) => self.lost(),
        }
    }

    fn lost(&mut self) -> PeakMessage {
        self.join();
        PeakMessage::Error {
            message: "peak reducer stopped without a result".into(),
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
