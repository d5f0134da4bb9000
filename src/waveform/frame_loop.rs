// src/waveform/frame_loop.rs

use log::debug;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default cadence, matching the terminal UI's 20 FPS.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    /// Time since the loop started.
    pub elapsed: Duration,
}

/// A periodic frame callback on its own thread.
///
/// The callback returns `false` to stop requesting frames. Dropping the loop
/// cancels it and waits for the thread.
pub struct FrameLoop {
    cancel: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FrameLoop {
    pub fn start<F>(interval: Duration, mut frame: F) -> io::Result<Self>
    where
        F: FnMut(FrameTick) -> bool + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let cancel_cb = Arc::clone(&cancel);
        let frames_cb = Arc::clone(&frames);

        let handle = thread::Builder::new().name("frame-loop".into()).spawn(move || {
            let started = Instant::now();
            let mut next = started;
            while !cancel_cb.load(Ordering::Acquire) {
                let index = frames_cb.fetch_add(1, Ordering::AcqRel);
                let keep_going = frame(FrameTick {
                    index,
                    elapsed: started.elapsed(),
                });
                if !keep_going {
                    break;
                }
                next += interval;
                // Skip missed frames instead of bursting to catch up.
                let now = Instant::now();
                if next < now {
                    next = now;
                }
                while !cancel_cb.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now >= next {
                        break;
                    }
                    thread::park_timeout(next - now);
                }
            }
            debug!("frame loop stopped after {} frames", frames_cb.load(Ordering::Acquire));
        })?;

        Ok(Self {
            cancel,
            frames,
            handle: Some(handle),
        })
    }

    /// Stop requesting frames. Takes effect before the next frame.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Cancel and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
