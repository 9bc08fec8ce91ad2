// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! FM discriminator and envelope conditioning (§4.4).

use num_complex::Complex;
use vrx_core::math::moving_average;

/// Quadrature FM discriminator: `angle(x[n] * conj(x[n-1]))` for `n` in `1..N`.
/// Output has length `N - 1`; returns an empty vector for inputs shorter than 2.
#[must_use]
pub fn discriminate(samples: &[Complex<f32>]) -> Vec<f32> {
    if samples.len() < 2 {
        return Vec::new();
    }
    samples
        .windows(2)
        .map(|pair| (pair[1] * pair[0].conj()).arg())
        .collect()
}

const DC_BLOCK_ALPHA: f32 = 0.001;

/// One-pole DC blocker: `lp <- (1-a)*lp + a*x[n]; y[n] = x[n] - lp`.
///
/// `lp` initializes to the first processed sample so the filter starts
/// already settled rather than ramping up from zero.
#[derive(Debug, Clone)]
pub struct DcBlock {
    alpha: f32,
    lp: Option<f32>,
}

impl DcBlock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            alpha: DC_BLOCK_ALPHA,
            lp: None,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let lp = self.lp.get_or_insert(x);
        *lp = (1.0 - self.alpha) * *lp + self.alpha * x;
        x - *lp
    }

    pub fn process_block(&mut self, input: &[f32]) -> Vec<f32> {
        input.iter().map(|&x| self.process(x)).collect()
    }
}

impl Default for DcBlock {
    fn default() -> Self {
        Self::new()
    }
}

const SMOOTHING_TAPS: usize = 32;

/// Full conditioning chain: discriminate -> DC block -> K=32 moving average.
#[must_use]
pub fn condition(samples: &[Complex<f32>], dc_block: &mut DcBlock) -> Vec<f32> {
    let discriminated = discriminate(samples);
    let dc_removed = dc_block.process_block(&discriminated);
    moving_average(&dc_removed, SMOOTHING_TAPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complex_tone(freq_norm: f32, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| Complex::from_polar(1.0, std::f32::consts::TAU * freq_norm * n as f32))
            .collect()
    }

    #[test]
    fn discriminate_silence_is_zero() {
        let input: Vec<Complex<f32>> = (0..8).map(|_| Complex::new(1.0, 0.0)).collect();
        let out = discriminate(&input);
        assert_eq!(out.len(), 7);
        for v in out {
            assert!(v.abs() < 1e-6);
        }
    }

    #[test]
    fn discriminate_constant_tone_yields_constant_phase_step() {
        let out = discriminate(&complex_tone(0.25, 16));
        assert_eq!(out.len(), 15);
        for v in out {
            assert!((v - std::f32::consts::FRAC_PI_2).abs() < 1e-4, "v={v}");
        }
    }

    #[test]
    fn discriminate_short_input_is_empty() {
        assert!(discriminate(&[Complex::new(1.0, 0.0)]).is_empty());
        assert!(discriminate(&[]).is_empty());
    }

    #[test]
    fn dc_block_removes_constant_offset() {
        let mut blocker = DcBlock::new();
        let input = vec![3.0_f32; 5000];
        let out = blocker.process_block(&input);
        let tail_mean: f32 = out[4000..].iter().sum::<f32>() / 1000.0;
        assert!(tail_mean.abs() < 0.05, "tail_mean={tail_mean}");
    }

    #[test]
    fn dc_block_idempotent_after_settling() {
        let mut first = DcBlock::new();
        let input = vec![2.5_f32; 6000];
        let once = first.process_block(&input);

        let mut second = DcBlock::new();
        let twice_pass1 = second.process_block(&once);
        let mean_once: f32 = once[5000..].iter().sum::<f32>() / 1000.0;
        let mean_twice: f32 = twice_pass1[5000..].iter().sum::<f32>() / 1000.0;
        assert!((mean_once - mean_twice).abs() < 0.05);
    }
}
