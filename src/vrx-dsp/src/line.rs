// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! FFT-based autocorrelation line-period estimator (§4.5).

use num_complex::Complex;
use rustfft::FftPlanner;

/// NTSC horizontal line rate, Hz.
pub const F_LINE_NTSC_HZ: f64 = 15_734.0;
/// PAL horizontal line rate, Hz.
pub const F_LINE_PAL_HZ: f64 = 15_625.0;

/// Result of a single line-period estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineEstimate {
    pub line_len_samples: usize,
    pub confidence: f32,
}

/// Bounds for the plausible lag range around a nominal line rate, per §4.5.
#[must_use]
pub fn lag_bounds(sr_hz: f64, f_line_hz: f64) -> (usize, usize) {
    let lo = (sr_hz / (f_line_hz * 1.15)).floor().max(1.0) as usize;
    let hi = (sr_hz / (f_line_hz * 0.85)).ceil() as usize;
    (lo, hi.max(lo + 1))
}

/// Estimate the line period (in samples) of `envelope` near `f_line_hz`.
///
/// De-means the input, zero-pads to the next power of two `>= 2N`, computes
/// the autocorrelation via an inverse FFT of `|X|^2`, and searches the first
/// `N` lags within the plausible window for the true line period.
#[must_use]
pub fn estimate_line_len(envelope: &[f32], sr_hz: f64, f_line_hz: f64) -> LineEstimate {
    let n = envelope.len();
    let (lag_lo, lag_hi) = lag_bounds(sr_hz, f_line_hz);
    if n < lag_hi + 1 {
        return LineEstimate {
            line_len_samples: lag_lo,
            confidence: 0.0,
        };
    }

    let mean: f32 = envelope.iter().sum::<f32>() / n as f32;
    let fft_len = (2 * n).next_power_of_two();

    let mut buf: Vec<Complex<f32>> = envelope
        .iter()
        .map(|&x| Complex::new(x - mean, 0.0))
        .collect();
    buf.resize(fft_len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f32>::new();
    let fwd = planner.plan_fft_forward(fft_len);
    let inv = planner.plan_fft_inverse(fft_len);

    fwd.process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex::new(c.re * c.re + c.im * c.im, 0.0);
    }
    inv.process(&mut buf);

    let autocorr: Vec<f32> = buf[..n].iter().map(|c| c.re / fft_len as f32).collect();

    let hi = lag_hi.min(autocorr.len().saturating_sub(1));
    let lo = lag_lo.min(hi);
    if lo >= hi {
        return LineEstimate {
            line_len_samples: lo,
            confidence: 0.0,
        };
    }

    let (best_lag, &peak) = autocorr[lo..=hi]
        .iter()
        .enumerate()
        .map(|(i, v)| (i + lo, v))
        .fold((lo, &autocorr[lo]), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        });

    const NEIGHBORHOOD: usize = 64;
    let nb_lo = best_lag.saturating_sub(NEIGHBORHOOD);
    let nb_hi = (best_lag + NEIGHBORHOOD).min(autocorr.len() - 1);
    let neighbor = autocorr[nb_lo..=nb_hi]
        .iter()
        .enumerate()
        .filter(|(i, _)| *i + nb_lo != best_lag)
        .map(|(_, v)| *v)
        .fold(f32::MIN, f32::max);

    let confidence = ((peak - neighbor).max(0.0) / (neighbor.abs() + 1e-6)).tanh();

    LineEstimate {
        line_len_samples: best_lag.clamp(lag_lo, lag_hi),
        confidence,
    }
}

/// Run the estimator for both NTSC and PAL nominal rates and keep whichever
/// has the higher confidence, used when the caller has no `prefer_ntsc` hint.
#[must_use]
pub fn estimate_line_len_auto(envelope: &[f32], sr_hz: f64) -> LineEstimate {
    let ntsc = estimate_line_len(envelope, sr_hz, F_LINE_NTSC_HZ);
    let pal = estimate_line_len(envelope, sr_hz, F_LINE_PAL_HZ);
    if pal.confidence > ntsc.confidence {
        pal
    } else {
        ntsc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic_pulse_train(sr_hz: f64, f_line_hz: f64, n: usize, noise_amp: f32) -> Vec<f32> {
        let period = sr_hz / f_line_hz;
        let mut state = 0x1234_5678_u32;
        let mut rand = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        (0..n)
            .map(|i| {
                let phase = (i as f64 % period) / period;
                let pulse = if phase < 0.3 { 1.0 } else { -1.0 };
                pulse + rand() * noise_amp
            })
            .collect()
    }

    #[test]
    fn line_estimate_within_bounds_ntsc() {
        let sr = 8_000_000.0;
        let envelope = periodic_pulse_train(sr, F_LINE_NTSC_HZ, 16_384, 0.3);
        let estimate = estimate_line_len(&envelope, sr, F_LINE_NTSC_HZ);
        let (lo, hi) = lag_bounds(sr, F_LINE_NTSC_HZ);
        assert!(estimate.line_len_samples >= lo && estimate.line_len_samples <= hi);
        assert!(estimate.line_len_samples >= 503 && estimate.line_len_samples <= 512);
        assert!(estimate.confidence > 0.3, "confidence={}", estimate.confidence);
    }

    #[test]
    fn line_estimate_always_within_lag_bounds_for_noise() {
        let sr = 8_000_000.0;
        let mut state = 42_u32;
        let envelope: Vec<f32> = (0..16_384)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let estimate = estimate_line_len(&envelope, sr, F_LINE_NTSC_HZ);
        let (lo, hi) = lag_bounds(sr, F_LINE_NTSC_HZ);
        assert!(estimate.line_len_samples >= lo && estimate.line_len_samples <= hi);
    }
}
