// src/decoder/dsp.rs

pub fn append_interleaved_to_planar(
    interleaved: &[f32],
    planar: &mut [Vec<f32>],
    channels: usize,
) {
    if channels == 0 {
        return;
    }
    let frames = interleaved.len() / channels;
    for ch in planar.iter_mut().take(channels) {
        ch.reserve(frames);
    }
    for row in interleaved.chunks_exact(channels) {
        for (ch, &s) in row.iter().enumerate() {
            planar[ch].push(s);
        }
    }
}

pub fn planar_len(planar: &[Vec<f32>]) -> usize {
    planar.iter().map(|v| v.len()).min().unwrap_or(0)
}

/// Fold one frame of any channel count onto a stereo pair.
/// Mono is duplicated, stereo passes through, wider layouts average
/// their first and second halves.
#[inline]
pub fn frame_to_stereo(frame: &[f32]) -> (f32, f32) {
    match frame.len() {
        0 => (0.0, 0.0),
        1 => (frame[0], frame[0]),
        2 => (frame[0], frame[1]),
        n => {
            let half = n / 2;
            let l = frame[..half].iter().sum::<f32>() / half as f32;
            let r = frame[half..].iter().sum::<f32>() / (n - half) as f32;
            (l, r)
        }
    }
}
