// src/live/param.rs

use super::context::AudioClock;
use log::debug;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Events a handle can queue ahead of the audio thread.
const EVENT_QUEUE: usize = 64;
/// Events the audio side keeps waiting for their start time.
const MAX_PENDING: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    /// Context time in seconds.
    pub time: f64,
    pub value: f32,
}

/// Newest value written while the event queue was full.
///
/// While `set` is raised the handle stops queueing and only overwrites `value`,
/// so everything still in the ring is older than the overflow value.
#[derive(Debug, Default)]
struct Overflow {
    set: AtomicBool,
    value: AtomicU32,
}

impl Overflow {
    fn store(&self, value: f32) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
        self.set.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<f32> {
        self.set
            .swap(false, Ordering::Acquire)
            .then(|| f32::from_bits(self.value.load(Ordering::Relaxed)))
    }
}

/// Create a scheduled parameter: the UI-side handle and the audio-side reader.
pub fn scheduled_param(
    initial: f32,
    min: f32,
    max: f32,
    clock: Arc<AudioClock>,
) -> (ParamHandle, ScheduledParam) {
    let initial = initial.clamp(min, max);
    let (producer, consumer) = HeapRb::<ParamEvent>::new(EVENT_QUEUE).split();
    let overflow = Arc::new(Overflow::default());
    (
        ParamHandle {
            producer,
            overflow: Arc::clone(&overflow),
            clock,
            min,
            max,
            last: initial,
        },
        ScheduledParam {
            consumer,
            overflow,
            pending: Vec::with_capacity(MAX_PENDING),
            value: initial,
        },
    )
}

/// Write side of an automated parameter. Owned by the control thread.
///
/// Values are clamped to the handle's range before they are queued, so the
/// audio thread never sees an out-of-range value. The newest value is never
/// dropped: when the queue is full (the context is suspended and nothing drains
/// it) it is kept aside and applied at the next rendered block.
pub struct ParamHandle {
    producer: HeapProd<ParamEvent>,
    overflow: Arc<Overflow>,
    clock: Arc<AudioClock>,
    min: f32,
    max: f32,
    last: f32,
}

impl ParamHandle {
    /// Queue a step change at `time` (context seconds).
    ///
    /// Returns `false` when the queue was full and the value was coalesced into
    /// the overflow slot instead; it then takes effect at the next block rather
    /// than at `time`.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) -> bool {
        let value = if value.is_nan() { self.last } else { value.clamp(self.min, self.max) };
        self.last = value;
        if self.overflow.set.load(Ordering::Acquire) {
            self.overflow.store(value);
            return false;
        }
        match self.producer.try_push(ParamEvent { time, value }) {
            Ok(()) => true,
            Err(_) => {
                self.overflow.store(value);
                false
            }
        }
    }

    /// Change the value at the clock's current time.
    pub fn set_value(&mut self, value: f32) {
        let now = self.clock.current_time();
        if !self.set_value_at_time(value, now) {
            debug!("parameter queue full, coalescing to {}", self.last);
        }
    }

    /// Newest value written, after clamping.
    pub fn value(&self) -> f32 {
        self.last
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }
}

/// Read side of an automated parameter. Owned by the audio thread; never allocates.
pub struct ScheduledParam {
    consumer: HeapCons<ParamEvent>,
    overflow: Arc<Overflow>,
    pending: Vec<ParamEvent>,
    value: f32,
}

impl ScheduledParam {
    /// Pull queued events and apply every one due at `now`. Returns the current value.
    pub fn advance(&mut self, now: f64) -> f32 {
        while let Some(event) = self.consumer.try_pop() {
            if self.pending.len() == MAX_PENDING {
                // Oldest scheduled step takes effect early rather than growing the list.
                let oldest = self.pending.remove(0);
                self.value = oldest.value;
            }
            let at = self
                .pending
                .iter()
                .position(|e| e.time > event.time)
                .unwrap_or(self.pending.len());
            self.pending.insert(at, event);
        }
        if let Some(latest) = self.overflow.take() {
            // Newer than anything queued or pending.
            self.pending.clear();
            self.value = latest;
        }

        let due = self.pending.iter().take_while(|e| e.time <= now).count();
        if due > 0 {
            self.value = self.pending[due - 1].value;
            self.pending.drain(..due);
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> Arc<AudioClock> {
        Arc::new(AudioClock::new(1_000))
    }

    #[test]
    fn values_are_clamped_at_write() {
        let (mut handle, mut param) = scheduled_param(0.0, -12.0, 12.0, clock());
        handle.set_value(40.0);
        assert_eq!(handle.value(), 12.0);
        assert_eq!(param.advance(0.0), 12.0);

        handle.set_value(-99.0);
        assert_eq!(param.advance(0.0), -12.0);
    }

    #[test]
    fn future_events_wait_for_their_time() {
        let (mut handle, mut param) = scheduled_param(1.0, 0.0, 4.0, clock());
        handle.set_value_at_time(2.0, 0.5);
        handle.set_value_at_time(3.0, 0.25);

        assert_eq!(param.advance(0.1), 1.0);
        assert_eq!(param.pending(), 2);
        assert_eq!(param.advance(0.3), 3.0);
        assert_eq!(param.advance(0.6), 2.0);
        assert_eq!(param.pending(), 0);
    }

    #[test]
    fn set_value_uses_clock_time() {
        let clock = clock();
        let (mut handle, mut param) = scheduled_param(0.0, 0.0, 1.0, clock.clone());
        clock.advance(500);
        handle.set_value(0.5);
        assert_eq!(param.advance(0.4), 0.0);
        assert_eq!(param.advance(0.5), 0.5);
    }

    #[test]
    fn nan_keeps_previous_value() {
        let (mut handle, mut param) = scheduled_param(0.25, 0.0, 1.0, clock());
        handle.set_value(f32::NAN);
        assert_eq!(param.advance(1.0), 0.25);
    }

    #[test]
    fn newest_value_survives_a_full_queue() {
        let (mut handle, mut param) = scheduled_param(0.0, -12.0, 12.0, clock());
        for i in 0..=100 {
            handle.set_value(i as f32 / 20.0);
        }
        assert_eq!(handle.value(), 5.0);
        assert_eq!(param.advance(0.0), 5.0);
        assert_eq!(param.pending(), 0);

        // Once drained, writes are queued again.
        assert!(handle.set_value_at_time(-3.0, 0.0));
        assert_eq!(param.advance(0.0), -3.0);
    }

    #[test]
    fn overflow_overrides_stale_future_events() {
        let (mut handle, mut param) = scheduled_param(0.0, 0.0, 10.0, clock());
        for _ in 0..EVENT_QUEUE {
            assert!(handle.set_value_at_time(9.0, 5.0));
        }
        assert!(!handle.set_value_at_time(1.0, 0.0));
        assert_eq!(param.advance(0.0), 1.0);
        assert_eq!(param.advance(10.0), 1.0);
    }
}
