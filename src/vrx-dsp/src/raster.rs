// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Raster assembly, inter-line correlation quality, and percentile
//! normalization to 8-bit grayscale (§4.6).

use vrx_core::math::percentile;

/// Result of assembling one raster frame.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub quality: f32,
}

/// Assemble `envelope` (length `>= line_len * height` preferred, edge-padded
/// on the left otherwise) into a `width x height` 8-bit grayscale raster.
#[must_use]
pub fn assemble(envelope: &[f32], line_len: usize, width: usize, height: usize) -> Raster {
    let line_len = line_len.max(1);
    let needed = line_len * height;

    let padded: Vec<f32> = if envelope.len() >= needed {
        envelope[envelope.len() - needed..].to_vec()
    } else {
        let pad_value = envelope.first().copied().unwrap_or(0.0);
        let mut out = vec![pad_value; needed - envelope.len()];
        out.extend_from_slice(envelope);
        out
    };

    let rows: Vec<&[f32]> = padded.chunks(line_len).collect();

    let col_idx: Vec<usize> = if width <= 1 {
        vec![0; width]
    } else {
        (0..width)
            .map(|c| {
                let frac = c as f64 * (line_len - 1) as f64 / (width - 1) as f64;
                frac.round() as usize
            })
            .collect()
    };

    let mut resampled: Vec<Vec<f32>> = Vec::with_capacity(height);
    for row in &rows {
        let resampled_row: Vec<f32> = col_idx.iter().map(|&idx| row[idx.min(row.len() - 1)]).collect();
        resampled.push(resampled_row);
    }

    let quality = inter_line_quality(&resampled);
    let pixels = normalize_to_gray8(&resampled, width, height);

    Raster {
        width,
        height,
        pixels,
        quality,
    }
}

/// Normalize each row to zero-mean unit-variance, then compute the mean
/// pairwise correlation between adjacent rows, clamped to `[-1, 1]`.
fn inter_line_quality(rows: &[Vec<f32>]) -> f32 {
    if rows.len() < 2 {
        return 0.0;
    }
    let z_rows: Vec<Vec<f32>> = rows.iter().map(|row| zscore(row)).collect();

    let mut sum = 0.0_f32;
    let mut count = 0usize;
    for pair in z_rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let n = a.len().min(b.len());
        if n == 0 {
            continue;
        }
        let dot: f32 = a[..n].iter().zip(&b[..n]).map(|(x, y)| x * y).sum();
        sum += (dot / n as f32).clamp(-1.0, 1.0);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f32).clamp(-1.0, 1.0)
    }
}

fn zscore(row: &[f32]) -> Vec<f32> {
    let n = row.len().max(1) as f32;
    let mean = row.iter().sum::<f32>() / n;
    let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt().max(1e-9);
    row.iter().map(|v| (v - mean) / std).collect()
}

/// Map the full frame to `[0, 255]` via the 5th/95th percentile range.
fn normalize_to_gray8(rows: &[Vec<f32>], width: usize, height: usize) -> Vec<u8> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    let p5 = percentile(&flat, 5.0);
    let p95 = percentile(&flat, 95.0);
    let span = (p95 - p5).max(1e-6);

    let mut pixels = vec![0u8; width * height];
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, &v) in row.iter().enumerate() {
            let scaled = ((v - p5) / span * 255.0).clamp(0.0, 255.0);
            pixels[row_idx * width + col_idx] = scaled as u8;
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_produces_exact_pixel_count() {
        let envelope = vec![0.5_f32; 10_000];
        let raster = assemble(&envelope, 512, 320, 240);
        assert_eq!(raster.pixels.len(), 320 * 240);
    }

    #[test]
    fn perfectly_periodic_envelope_has_high_quality() {
        let line_len = 100;
        let height = 50;
        let envelope: Vec<f32> = (0..line_len * height)
            .map(|i| ((i % line_len) as f32 / line_len as f32 * std::f32::consts::TAU).sin())
            .collect();
        let raster = assemble(&envelope, line_len, 64, height);
        assert!(raster.quality >= 0.9, "quality={}", raster.quality);
    }

    #[test]
    fn white_noise_envelope_has_low_quality() {
        let line_len = 100;
        let height = 50;
        let mut state = 99_u32;
        let envelope: Vec<f32> = (0..line_len * height)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let raster = assemble(&envelope, line_len, 64, height);
        assert!(raster.quality.abs() < 0.15, "quality={}", raster.quality);
    }

    #[test]
    fn short_envelope_is_edge_padded_not_panicking() {
        let envelope = vec![1.0_f32; 10];
        let raster = assemble(&envelope, 50, 16, 4);
        assert_eq!(raster.pixels.len(), 16 * 4);
    }
}
