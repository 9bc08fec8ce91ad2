// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Candidate persistence collaborator: an in-process trait plus an
//! in-memory implementation satisfying the single-writer/stale-reader rule.

use std::collections::HashMap;
use std::sync::Mutex;

use vrx_core::model::{Candidate, CandidateStatus};

/// Upsert/list-top-K surface for scanned-channel candidates (§3, §4.3).
///
/// A single writer (the scanner's sweep loop) calls `upsert`; readers of
/// `top_k` may observe a slightly stale snapshot, which is acceptable per
/// the publish cadence in §4.3.
pub trait CandidateStore: Send {
    /// Record one observation for `freq_hz`. `hits` is incremented by the
    /// store itself (monotonic, never reset) whenever `ema_snr_db >= 0.0` —
    /// the smoothed value, not the raw per-sweep one, is what the
    /// persistence layer this design is modeled on keys debounce on.
    #[allow(clippy::too_many_arguments)]
    fn upsert(
        &mut self,
        freq_hz: u64,
        ema_power_db: f64,
        raw_power_db: f64,
        ema_snr_db: f64,
        raw_snr_db: f64,
        status: CandidateStatus,
        _unused_hits_hint: u64,
        now_rfc3339: &str,
    );

    /// The top `limit` candidates ordered by `ema_snr_db` descending.
    fn top_k(&self, limit: usize) -> Vec<Candidate>;
}

/// `Mutex<HashMap<freq_hz, Candidate>>`-backed store. Good enough to run the
/// scanner without an external database; a SQL-backed store is an external
/// collaborator out of scope here.
#[derive(Debug, Default)]
pub struct InMemoryCandidateStore {
    candidates: Mutex<HashMap<u64, Candidate>>,
}

impl InMemoryCandidateStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
        }
    }
}

impl CandidateStore for InMemoryCandidateStore {
    fn upsert(
        &mut self,
        freq_hz: u64,
        ema_power_db: f64,
        raw_power_db: f64,
        ema_snr_db: f64,
        raw_snr_db: f64,
        status: CandidateStatus,
        _unused_hits_hint: u64,
        now_rfc3339: &str,
    ) {
        let mut map = self.candidates.lock().expect("candidate store mutex poisoned");
        let entry = map
            .entry(freq_hz)
            .or_insert_with(|| Candidate::new_observation(freq_hz, raw_power_db, raw_snr_db, now_rfc3339));

        entry.ema_power_db = ema_power_db;
        entry.ema_snr_db = ema_snr_db;
        entry.last_raw_power_db = raw_power_db;
        entry.last_raw_snr_db = raw_snr_db;
        entry.last_seen = now_rfc3339.to_string();
        entry.status = status;
        if ema_snr_db >= 0.0 {
            entry.hits += 1;
        }
    }

    fn top_k(&self, limit: usize) -> Vec<Candidate> {
        let map = self.candidates.lock().expect("candidate store mutex poisoned");
        let mut all: Vec<Candidate> = map.values().cloned().collect();
        all.sort_by(|a, b| b.ema_snr_db.partial_cmp(&a.ema_snr_db).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_new_candidate_with_zero_hits_then_increments() {
        let mut store = InMemoryCandidateStore::new();
        store.upsert(5_806_000_000, -40.0, -40.0, 2.0, 2.0, CandidateStatus::New, 0, "2026-08-01T00:00:00Z");
        let top = store.top_k(10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].hits, 1);
        assert_eq!(top[0].first_seen, "2026-08-01T00:00:00Z");

        store.upsert(5_806_000_000, -38.0, -38.0, 3.0, 3.0, CandidateStatus::Active, 0, "2026-08-01T00:00:01Z");
        let top = store.top_k(10);
        assert_eq!(top[0].hits, 2);
        assert_eq!(top[0].last_seen, "2026-08-01T00:00:01Z");
        assert_eq!(top[0].first_seen, "2026-08-01T00:00:00Z");
    }

    #[test]
    fn top_k_orders_by_ema_snr_descending() {
        let mut store = InMemoryCandidateStore::new();
        store.upsert(1, -50.0, -50.0, 1.0, 1.0, CandidateStatus::New, 0, "t");
        store.upsert(2, -50.0, -50.0, 9.0, 9.0, CandidateStatus::New, 0, "t");
        store.upsert(3, -50.0, -50.0, 5.0, 5.0, CandidateStatus::New, 0, "t");
        let top = store.top_k(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].freq_hz, 2);
        assert_eq!(top[1].freq_hz, 3);
    }

    #[test]
    fn negative_ema_snr_does_not_increment_hits() {
        let mut store = InMemoryCandidateStore::new();
        store.upsert(1, -60.0, -60.0, -3.0, -3.0, CandidateStatus::Lost, 0, "t");
        assert_eq!(store.top_k(1)[0].hits, 0);
    }

    #[test]
    fn hits_follow_ema_snr_not_raw_snr() {
        let mut store = InMemoryCandidateStore::new();
        // A noisy raw reading below zero shouldn't suppress a hit while the
        // smoothed value is still over threshold...
        store.upsert(1, -50.0, -50.0, 1.0, -5.0, CandidateStatus::Active, 0, "t0");
        assert_eq!(store.top_k(1)[0].hits, 1);
        // ...and a noisy raw spike above zero shouldn't count one while the
        // smoothed value hasn't caught up yet.
        store.upsert(1, -50.0, -50.0, -1.0, 5.0, CandidateStatus::Lost, 0, "t1");
        assert_eq!(store.top_k(1)[0].hits, 1);
    }
}
