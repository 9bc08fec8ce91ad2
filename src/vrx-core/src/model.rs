// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared data types that cross the scanner/DSP/control-plane boundaries.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Debounced activity status of a scanned channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    New,
    Active,
    Lost,
}

/// A scanned channel's smoothed power/SNR history and debounced status.
///
/// Invariants: `first_seen <= last_seen`; `hits` never decreases. This type
/// carries `status` but does not compute it: the scanner's sweep loop
/// decides New/Active/Lost from its N-of-M activity window and passes the
/// result in on each `upsert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub freq_hz: u64,
    pub ema_power_db: f64,
    pub ema_snr_db: f64,
    pub last_raw_power_db: f64,
    pub last_raw_snr_db: f64,
    pub first_seen: String,
    pub last_seen: String,
    pub hits: u64,
    pub status: CandidateStatus,
}

impl Candidate {
    /// Build a fresh candidate from a first raw observation.
    ///
    /// EMAs are initialized to the raw measurement, per §4.3.
    pub fn new_observation(freq_hz: u64, power_db: f64, snr_db: f64, now_rfc3339: &str) -> Self {
        Self {
            freq_hz,
            ema_power_db: power_db,
            ema_snr_db: snr_db,
            last_raw_power_db: power_db,
            last_raw_snr_db: snr_db,
            first_seen: now_rfc3339.to_string(),
            last_seen: now_rfc3339.to_string(),
            hits: 0,
            status: CandidateStatus::New,
        }
    }
}

/// Bounded FIFO of the last `M` boolean activity observations for one channel.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    max_len: usize,
    observations: VecDeque<bool>,
}

impl ActivityWindow {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            observations: VecDeque::with_capacity(max_len.max(1)),
        }
    }

    /// Record a new observation, dropping the oldest beyond `max_len`.
    pub fn push(&mut self, active: bool) {
        if self.observations.len() >= self.max_len {
            self.observations.pop_front();
        }
        self.observations.push_back(active);
    }

    /// Count of `true` observations currently in the window.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.observations.iter().filter(|&&b| b).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Pixel format of a published [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Gray8,
    Bgr24,
}

impl FrameFormat {
    /// Bytes per pixel for this format.
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Bgr24 => 3,
        }
    }
}

/// A single demodulated video frame: metadata plus its pixel buffer.
///
/// Immutable after construction. `pixels.len()` always equals
/// `width * height * format.bytes_per_pixel()`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Seconds since the Unix epoch, as an `f64` per the wire metadata schema.
    pub timestamp: f64,
    /// The demodulator's *current* tuned frequency at emission time, which
    /// may have drifted from the original focus request by up to the AFC
    /// search radius (see Design Notes / DESIGN.md).
    pub tuned_freq_hz: u64,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: FrameFormat,
        tuned_freq_hz: u64,
        pixels: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * format.bytes_per_pixel()
        );
        Self {
            width,
            height,
            format,
            timestamp: unix_timestamp_secs(),
            tuned_freq_hz,
            pixels,
        }
    }
}

fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Demodulator auto-tune session state. Lives for one focus session.
#[derive(Debug, Clone)]
pub struct TuneState {
    pub base_freq_hz: u64,
    pub tuned_freq_hz: u64,
    pub line_len_samples: usize,
    pub last_quality: f32,
    pub last_relock_ts: f64,
    pub lna_gain: u8,
    pub vga_gain: u8,
    pub amp_enabled: bool,
}

impl TuneState {
    pub fn new(base_freq_hz: u64, lna_gain: u8, vga_gain: u8, amp_enabled: bool) -> Self {
        Self {
            base_freq_hz,
            tuned_freq_hz: base_freq_hz,
            line_len_samples: 0,
            last_quality: 0.0,
            last_relock_ts: 0.0,
            lna_gain,
            vga_gain,
            amp_enabled,
        }
    }

    /// Clamp gains to the bounds in §3: `lna in [0,40]`, `vga in [0,62]`.
    pub fn clamp_gains(&mut self) {
        self.lna_gain = self.lna_gain.min(40);
        self.vga_gain = self.vga_gain.min(62);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_window_drops_oldest_beyond_capacity() {
        let mut win = ActivityWindow::new(3);
        win.push(true);
        win.push(true);
        win.push(true);
        assert_eq!(win.hits(), 3);
        win.push(false);
        assert_eq!(win.len(), 3);
        assert_eq!(win.hits(), 2);
    }

    #[test]
    fn candidate_first_seen_le_last_seen() {
        let c = Candidate::new_observation(5_806_000_000, -40.0, 12.0, "2026-08-01T00:00:00Z");
        assert!(c.first_seen <= c.last_seen);
        assert_eq!(c.hits, 0);
    }

    #[test]
    fn frame_pixel_buffer_matches_dimensions() {
        let frame = Frame::new(4, 2, FrameFormat::Gray8, 5_806_000_000, vec![0u8; 8]);
        assert_eq!(frame.pixels.len(), (frame.width * frame.height) as usize);
    }

    #[test]
    fn tune_state_clamp_gains_respects_bounds() {
        let mut ts = TuneState::new(5_806_000_000, 200, 200, true);
        ts.clamp_gains();
        assert_eq!(ts.lna_gain, 40);
        assert_eq!(ts.vga_gain, 62);
    }
}
