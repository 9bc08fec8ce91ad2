// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Small numeric helpers shared by the scanner and the DSP pipeline.

/// First-order exponential moving average: `ema <- (1-alpha)*ema + alpha*raw`.
///
/// Bounded: if `raw` and the previous `ema` both lie in `[a, b]`, the result
/// also lies in `[a, b]`, since it is a convex combination of the two.
#[must_use]
pub fn ema_update(prev: f64, raw: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * prev + alpha * raw
}

/// Symmetric moving-average (boxcar) smoothing, same-length output.
///
/// Each output sample is the mean of up to `taps` neighbours centered on it;
/// windows are truncated at the buffer edges rather than zero-padded, so the
/// result never dims the envelope near the boundaries.
#[must_use]
pub fn moving_average(input: &[f32], taps: usize) -> Vec<f32> {
    if taps <= 1 || input.is_empty() {
        return input.to_vec();
    }
    let half = taps / 2;
    let n = input.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let slice = &input[lo..hi];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

/// Linear-interpolated percentile of a slice, `p` in `[0, 100]`.
///
/// Operates on a sorted copy; does not mutate the caller's buffer.
#[must_use]
pub fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f32;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Median of a slice of `f32`, via a sorted copy. Returns `0.0` for empty input.
#[must_use]
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    percentile(values, 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_update_bounded_between_inputs() {
        let mut ema = 5.0;
        for _ in 0..100 {
            ema = ema_update(ema, 20.0, 0.1);
            assert!((5.0..=20.0).contains(&ema));
        }
    }

    #[test]
    fn ema_update_converges() {
        let mut ema = 0.0;
        for _ in 0..200 {
            ema = ema_update(ema, 20.0, 0.1);
        }
        assert!((ema - 20.0).abs() < 0.5, "ema={ema}");
    }

    #[test]
    fn moving_average_preserves_length_and_dc() {
        let input = vec![1.0_f32; 64];
        let out = moving_average(&input, 32);
        assert_eq!(out.len(), input.len());
        for v in out {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn percentile_matches_known_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-5);
        assert!((percentile(&values, 100.0) - 5.0).abs() < 1e-5);
        assert!((median(&values) - 3.0).abs() < 1e-5);
    }
}
