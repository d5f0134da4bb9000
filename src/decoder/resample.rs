// src/decoder/resample.rs

/// Output length for a rate change: `round(len * dst / src)`.
pub fn resampled_len(source_len: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 || src_rate == dst_rate {
        return source_len;
    }
    (source_len as f64 * dst_rate as f64 / src_rate as f64).round() as usize
}

/// Nearest-index rate conversion.
///
/// Output sample `i` is source sample `floor(i * (source_len / output_len))`.
/// No interpolation and no anti-alias filtering: the size/quality estimate
/// downstream is calibrated against exactly this cost model.
pub fn resample_nearest(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate {
        return input.to_vec();
    }
    let out_len = resampled_len(input.len(), src_rate, dst_rate);
    if out_len == 0 {
        return Vec::new();
    }
    let step = input.len() as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            let idx = (i as f64 * step).floor() as usize;
            input.get(idx).copied().unwrap_or(0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let input = [0.1, 0.2, 0.3];
        assert_eq!(resample_nearest(&input, 44_100, 44_100), input.to_vec());
    }

    #[test]
    fn upsampling_repeats_samples() {
        let out = resample_nearest(&[1.0, 2.0, 3.0, 4.0], 100, 200);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn downsampling_picks_floor_index() {
        let input: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let out = resample_nearest(&input, 200, 100);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn length_is_rounded() {
        assert_eq!(resampled_len(44_100, 44_100, 48_000), 48_000);
        assert_eq!(resampled_len(3, 44_100, 48_000), 3);
        assert_eq!(resampled_len(7, 3, 2), 5);
    }

    #[test]
    fn empty_input() {
        assert!(resample_nearest(&[], 100, 300).is_empty());
    }
}
