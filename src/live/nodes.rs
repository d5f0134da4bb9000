// src/live/nodes.rs

use super::context::GRAPH_CHANNELS;
use super::param::ScheduledParam;

/// Mid/side widener: the side signal is scaled by `1 + percent / 100`.
pub struct StereoWidener {
    percent: ScheduledParam,
}

impl StereoWidener {
    pub fn new(percent: ScheduledParam) -> Self {
        Self { percent }
    }

    pub fn process(&mut self, block: &mut [f32], now: f64) {
        let width = 1.0 + self.percent.advance(now) / 100.0;
        for frame in block.chunks_exact_mut(GRAPH_CHANNELS) {
            let mid = (frame[0] + frame[1]) * 0.5;
            let side = (frame[0] - frame[1]) * 0.5 * width;
            frame[0] = mid + side;
            frame[1] = mid - side;
        }
    }
}

/// Output gain (linear). Steps are ramped across one block.
pub struct GainStage {
    gain: ScheduledParam,
    current: f32,
}

impl GainStage {
    pub fn new(gain: ScheduledParam) -> Self {
        let current = gain.value();
        Self { gain, current }
    }

    pub fn process(&mut self, block: &mut [f32], now: f64) {
        let target = self.gain.advance(now);
        let frames = block.len() / GRAPH_CHANNELS;
        if frames == 0 {
            return;
        }

        if (target - self.current).abs() < 1e-6 {
            if (target - 1.0).abs() > 1e-6 {
                for s in block.iter_mut() {
                    *s *= target;
                }
            }
            return;
        }

        let step = (target - self.current) / frames as f32;
        for (i, frame) in block.chunks_exact_mut(GRAPH_CHANNELS).enumerate() {
            let g = self.current + step * (i + 1) as f32;
            frame[0] *= g;
            frame[1] *= g;
        }
        self.current = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::context::AudioClock;
    use crate::live::param::scheduled_param;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn clock() -> Arc<AudioClock> {
        Arc::new(AudioClock::new(1_000))
    }

    #[test]
    fn zero_width_is_identity_and_mono_stays_mono() {
        let (_h, p) = scheduled_param(0.0, 0.0, 100.0, clock());
        let mut w = StereoWidener::new(p);
        let mut block = vec![0.3, 0.1, 0.5, 0.5];
        w.process(&mut block, 0.0);
        assert_relative_eq!(block[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(block[1], 0.1, epsilon = 1e-6);
        assert_eq!(block[2], block[3]);
    }

    #[test]
    fn full_width_doubles_side() {
        let (_h, p) = scheduled_param(100.0, 0.0, 100.0, clock());
        let mut w = StereoWidener::new(p);
        let mut block = vec![0.3, 0.1];
        w.process(&mut block, 0.0);
        // mid 0.2, side 0.1 * 2
        assert_relative_eq!(block[0], 0.4, epsilon = 1e-6);
        assert_relative_eq!(block[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn gain_step_ramps_then_holds() {
        let (mut h, p) = scheduled_param(1.0, 0.0, 4.0, clock());
        let mut g = GainStage::new(p);
        h.set_value_at_time(0.0, 0.0);

        let mut block = vec![1.0; 8];
        g.process(&mut block, 0.0);
        assert_relative_eq!(block[0], 0.75, epsilon = 1e-6);
        assert_relative_eq!(block[6], 0.0, epsilon = 1e-6);

        let mut next = vec![1.0; 4];
        g.process(&mut next, 0.01);
        assert!(next.iter().all(|&s| s == 0.0));
    }
}
