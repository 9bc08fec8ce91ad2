// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The scanner: round-robin dwell sweep, EMA smoothing, N-of-M activity
//! debounce, and a top-K candidate snapshot publisher (§4.3).

pub mod store;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use vrx_core::math::ema_update;
use vrx_core::model::{ActivityWindow, Candidate, CandidateStatus};
use vrx_dsp::sample_source::SampleSource;

pub use store::{CandidateStore, InMemoryCandidateStore};

/// Per-sweep scanner tuning, matching the `[scanner]` config schema.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub channels_hz: Vec<u64>,
    pub sample_rate_hz: f64,
    pub dwell_ms: u64,
    pub channel_bw_hz: f64,
    pub min_snr_db: f64,
    pub alert_hits: usize,
    pub alert_window: usize,
    pub ema_alpha: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            channels_hz: vrx_core::RACEBAND_CHANNELS_HZ.to_vec(),
            sample_rate_hz: 8_000_000.0,
            dwell_ms: 15,
            channel_bw_hz: 8_000_000.0,
            min_snr_db: 6.0,
            alert_hits: 3,
            alert_window: 5,
            ema_alpha: 0.1,
        }
    }
}

/// Wire snapshot of the top-K candidates by smoothed SNR.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSnapshot {
    pub items: Vec<Candidate>,
}

/// Publishing surface for scanner snapshots, mirroring the frame publisher's
/// fire-and-forget contract (§4.8): slow subscribers lag, the scanner never blocks.
pub trait EventPublisher: Send {
    fn publish_snapshot(&self, snapshot: &CandidateSnapshot);
}

/// No-op publisher, useful when nothing is subscribed to scanner events yet.
#[derive(Debug, Default)]
pub struct NullEventPublisher;

impl EventPublisher for NullEventPublisher {
    fn publish_snapshot(&self, _snapshot: &CandidateSnapshot) {}
}

const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(200);
const TOP_K: usize = 10;

/// Owns a [`SampleSource`] exclusively for the duration of a scan session and
/// drives the round-robin dwell sweep described in §4.3.
pub struct Scanner<S: CandidateStore> {
    config: ScannerConfig,
    source: SampleSource,
    store: S,
    ema_power_db: Vec<f64>,
    ema_snr_db: Vec<f64>,
    windows: Vec<ActivityWindow>,
}

impl<S: CandidateStore> Scanner<S> {
    #[must_use]
    pub fn new(config: ScannerConfig, source: SampleSource, store: S) -> Self {
        let n = config.channels_hz.len();
        let windows = (0..n).map(|_| ActivityWindow::new(config.alert_window)).collect();
        Self {
            ema_power_db: vec![-60.0; n],
            ema_snr_db: vec![0.0; n],
            windows,
            config,
            source,
            store,
        }
    }

    fn num_samples(&self) -> usize {
        ((self.config.sample_rate_hz * self.config.dwell_ms as f64 / 1000.0) as usize).max(1024)
    }

    /// Run the sweep until `stop` is set. `now_rfc3339` supplies the current
    /// timestamp for candidate bookkeeping (kept out of this loop so callers
    /// can inject a deterministic clock in tests).
    pub async fn run<F, P>(&mut self, mut stop: watch::Receiver<bool>, mut now_rfc3339: F, publisher: &P)
    where
        F: FnMut() -> String,
        P: EventPublisher,
    {
        let num_samples = self.num_samples();
        let analyzer = vrx_dsp::spectrum::SpectrumAnalyzer::new(num_samples);
        let guard_hz = self.config.channel_bw_hz * 0.00625;
        let mut last_push = std::time::Instant::now() - SNAPSHOT_INTERVAL;

        'sweep: while !*stop.borrow() {
            for idx in 0..self.config.channels_hz.len() {
                if *stop.borrow() {
                    break 'sweep;
                }
                let freq_hz = self.config.channels_hz[idx];
                let iq = self.source.capture(freq_hz, num_samples);
                let metrics = analyzer.band_metrics(&iq, self.config.sample_rate_hz, self.config.channel_bw_hz, guard_hz);

                self.ema_power_db[idx] = ema_update(self.ema_power_db[idx], metrics.band_power_db, self.config.ema_alpha);
                self.ema_snr_db[idx] = ema_update(self.ema_snr_db[idx], metrics.snr_mean_db, self.config.ema_alpha);

                let is_candidate = self.ema_snr_db[idx] >= self.config.min_snr_db;
                self.windows[idx].push(is_candidate);
                let hits = self.windows[idx].hits();
                let status = if hits >= self.config.alert_hits
                    && self.windows[idx].len() >= self.config.alert_window.min(self.config.alert_hits)
                {
                    CandidateStatus::Active
                } else if is_candidate {
                    CandidateStatus::New
                } else {
                    CandidateStatus::Lost
                };

                let now = now_rfc3339();
                self.store.upsert(
                    freq_hz,
                    self.ema_power_db[idx],
                    metrics.band_power_db,
                    self.ema_snr_db[idx],
                    metrics.snr_mean_db,
                    status,
                    hits as u64,
                    &now,
                );

                if last_push.elapsed() >= SNAPSHOT_INTERVAL {
                    let items = self.store.top_k(TOP_K);
                    publisher.publish_snapshot(&CandidateSnapshot { items });
                    last_push = std::time::Instant::now();
                }

                tokio::time::sleep(Duration::from_millis(self.config.dwell_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrx_dsp::sample_source::SyntheticIqSource;

    fn fixed_clock() -> impl FnMut() -> String {
        || "2026-08-01T00:00:00Z".to_string()
    }

    #[tokio::test]
    async fn single_sweep_reaches_active_on_hot_channel() {
        let hot = 5_806_000_000u64;
        let config = ScannerConfig {
            channels_hz: vec![hot],
            sample_rate_hz: 2_000_000.0,
            dwell_ms: 1,
            channel_bw_hz: 2_000_000.0,
            min_snr_db: 1.0,
            alert_hits: 3,
            alert_window: 5,
            ema_alpha: 0.5,
        };
        let source = SampleSource::new(Box::new(SyntheticIqSource::new(
            config.sample_rate_hz,
            Some(hot),
            3,
        )));
        let store = InMemoryCandidateStore::new();
        let mut scanner = Scanner::new(config, source, store);

        let (tx, rx) = watch::channel(false);
        let publisher = NullEventPublisher;

        let run = async {
            scanner.run(rx, fixed_clock(), &publisher).await;
        };
        tokio::select! {
            _ = run => {}
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                let _ = tx.send(true);
            }
        }

        let top = scanner.store.top_k(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].freq_hz, hot);
    }

    #[test]
    fn num_samples_respects_floor() {
        let config = ScannerConfig {
            sample_rate_hz: 1_000.0,
            dwell_ms: 1,
            ..ScannerConfig::default()
        };
        let source = SampleSource::new(Box::new(SyntheticIqSource::new(1_000.0, None, 0)));
        let scanner = Scanner::new(config, source, InMemoryCandidateStore::new());
        assert_eq!(scanner.num_samples(), 1024);
    }
}
