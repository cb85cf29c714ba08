//! Document store for candidate QSO partners and the history that outlives
//! them: the `calls`, `message`, `grid`, and operator-namespaced blacklist
//! collections MongoDB held in the original.
//!
//! Grounded on `receiver.py`'s collection usage (`call_coll.find_one`,
//! `find_one_and_delete`, `update_one(..., upsert=True)`) and
//! `adif_parser.py`'s `done_coll.update_one`.

mod mongo_backend;

use async_trait::async_trait;
use snafu::Snafu;

use crate::model::{BlacklistEntry, Candidate, GridHint, MessageHistory, Mode};

pub use mongo_backend::MongoCandidateStore;

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("candidate store backend error: {message}"))]
    Backend { message: String },
}

/// Natural key for the `calls` and `message` collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    pub callsign: String,
    pub band: i64,
    pub mode: Mode,
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Insert or overwrite the candidate row for `key`.
    async fn upsert_candidate(&self, key: &CandidateKey, candidate: Candidate) -> Result<(), StoreError>;

    /// Atomically fetch and remove the existing candidate row, if any —
    /// mirrors `find_one_and_delete`, used so a fresh decode always starts
    /// from a clean slate while still letting the caller see what was
    /// there before.
    async fn take_candidate(&self, key: &CandidateKey) -> Result<Option<Candidate>, StoreError>;

    /// The best candidate to reply to right now, already filtered to
    /// `mode`/`band`/`expired=false`/`tried=false`/`isSpam=false` and
    /// sorted importance-first, optionally narrowed to one slot parity.
    async fn best_candidate(
        &self,
        band: i64,
        mode: Mode,
        is_even: Option<bool>,
    ) -> Result<Option<Candidate>, StoreError>;

    /// Bulk cutoff sweep run at "done transmitting" time: marks rows
    /// past the expiry/spam-release cutoffs. Returns the number touched.
    async fn apply_cutoffs(
        &self,
        band: i64,
        mode: Mode,
        expired_before: f64,
        release_spam_before: f64,
    ) -> Result<u64, StoreError>;

    /// Drops every `calls`/`message` row for a band/mode no longer active,
    /// mirroring the bulk delete on band/mode change.
    async fn clear_band_mode(&self, band: i64, mode: Mode) -> Result<(), StoreError>;

    async fn upsert_history(&self, history: MessageHistory) -> Result<(), StoreError>;
    async fn history(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<MessageHistory>, StoreError>;

    async fn upsert_grid_hint(&self, hint: GridHint) -> Result<(), StoreError>;
    async fn grid_hint(&self, callsign: &str) -> Result<Option<GridHint>, StoreError>;

    async fn blacklist_entry(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<BlacklistEntry>, StoreError>;
    async fn upsert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<(), StoreError>;

    /// Startup sweep: a `logScript` row old enough is adopted as
    /// authoritative rather than waiting on a `LoggedAdif` reconciliation
    /// that may never arrive. Returns the number of rows touched.
    async fn release_stale_log_script(&self, before: f64) -> Result<u64, StoreError>;
}

/// In-memory store for tests: one map per collection, keyed the way the
/// real collections are indexed.
#[derive(Default)]
pub struct InMemoryCandidateStore {
    calls: std::sync::Mutex<std::collections::HashMap<CandidateKey, Candidate>>,
    messages: std::sync::Mutex<std::collections::HashMap<CandidateKey, MessageHistory>>,
    grids: std::sync::Mutex<std::collections::HashMap<String, GridHint>>,
    blacklist: std::sync::Mutex<std::collections::HashMap<CandidateKey, BlacklistEntry>>,
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn upsert_candidate(&self, key: &CandidateKey, candidate: Candidate) -> Result<(), StoreError> {
        self.calls.lock().unwrap().insert(key.clone(), candidate);
        Ok(())
    }

    async fn take_candidate(&self, key: &CandidateKey) -> Result<Option<Candidate>, StoreError> {
        Ok(self.calls.lock().unwrap().remove(key))
    }

    async fn best_candidate(
        &self,
        band: i64,
        mode: Mode,
        is_even: Option<bool>,
    ) -> Result<Option<Candidate>, StoreError> {
        let calls = self.calls.lock().unwrap();
        let mut matching: Vec<&Candidate> = calls
            .values()
            .filter(|c| {
                c.band == band
                    && c.mode == mode
                    && !c.expired
                    && !c.tried
                    && !c.is_spam
                    && is_even.map(|parity| c.is_even == parity).unwrap_or(true)
            })
            .collect();
        matching.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap());
        Ok(matching.into_iter().next().cloned())
    }

    async fn apply_cutoffs(
        &self,
        band: i64,
        mode: Mode,
        expired_before: f64,
        release_spam_before: f64,
    ) -> Result<u64, StoreError> {
        let mut calls = self.calls.lock().unwrap();
        let mut touched = 0u64;
        for candidate in calls.values_mut() {
            if candidate.band != band || candidate.mode != mode {
                continue;
            }
            if !candidate.expired && candidate.importance < 2.0 && candidate.timestamp < expired_before {
                candidate.expired = true;
                touched += 1;
            }
            if candidate.is_spam && candidate.timestamp < release_spam_before {
                candidate.is_spam = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn clear_band_mode(&self, band: i64, mode: Mode) -> Result<(), StoreError> {
        self.calls.lock().unwrap().retain(|k, _| !(k.band == band && k.mode == mode));
        self.messages.lock().unwrap().retain(|k, _| !(k.band == band && k.mode == mode));
        Ok(())
    }

    async fn upsert_history(&self, history: MessageHistory) -> Result<(), StoreError> {
        let key = CandidateKey { callsign: history.callsign.clone(), band: history.band, mode: history.mode };
        self.messages.lock().unwrap().insert(key, history);
        Ok(())
    }

    async fn history(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<MessageHistory>, StoreError> {
        let key = CandidateKey { callsign: callsign.to_string(), band, mode };
        Ok(self.messages.lock().unwrap().get(&key).cloned())
    }

    async fn upsert_grid_hint(&self, hint: GridHint) -> Result<(), StoreError> {
        self.grids.lock().unwrap().insert(hint.callsign.clone(), hint);
        Ok(())
    }

    async fn grid_hint(&self, callsign: &str) -> Result<Option<GridHint>, StoreError> {
        Ok(self.grids.lock().unwrap().get(callsign).cloned())
    }

    async fn blacklist_entry(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<BlacklistEntry>, StoreError> {
        let key = CandidateKey { callsign: callsign.to_string(), band, mode };
        Ok(self.blacklist.lock().unwrap().get(&key).cloned())
    }

    async fn upsert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        let key = CandidateKey { callsign: entry.callsign.clone(), band: entry.band, mode: entry.mode };
        self.blacklist.lock().unwrap().insert(key, entry);
        Ok(())
    }

    async fn release_stale_log_script(&self, before: f64) -> Result<u64, StoreError> {
        let mut blacklist = self.blacklist.lock().unwrap();
        let mut touched = 0u64;
        for entry in blacklist.values_mut() {
            if entry.log_script && entry.timestamp <= before {
                entry.log_script = false;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate(importance: f64) -> Candidate {
        Candidate {
            callsign: "W9XYZ".to_string(),
            prefixed_callsign: "W9XYZ".to_string(),
            band: 20,
            mode: Mode::Ft8,
            message: "K1ABC W9XYZ -12".to_string(),
            candidate_type: crate::model::CandidateType::Snr,
            next_tx: crate::model::CandidateType::Rsnr,
            snr: -12,
            time_ms: 0,
            delta_time: 0.1,
            delta_frequency: 1500,
            grid: None,
            country: None,
            continent: None,
            dxcc: None,
            addressed_to_us: true,
            is_new_callsign: true,
            is_new_dxcc: false,
            is_vip_dxcc: false,
            is_valid: true,
            skip_grid: true,
            importance,
            tries: 0,
            max_transmit_count: 10,
            num_inactive_before_cut: 3,
            expired: false,
            tried: false,
            is_reemerging: false,
            is_spam: false,
            is_even: true,
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn best_candidate_picks_highest_importance() {
        let store = InMemoryCandidateStore::default();
        let low_key = CandidateKey { callsign: "N0AAA".to_string(), band: 20, mode: Mode::Ft8 };
        let high_key = CandidateKey { callsign: "W9XYZ".to_string(), band: 20, mode: Mode::Ft8 };
        store.upsert_candidate(&low_key, sample_candidate(1.0)).await.unwrap();
        store.upsert_candidate(&high_key, sample_candidate(4.0)).await.unwrap();

        let best = store.best_candidate(20, Mode::Ft8, None).await.unwrap().unwrap();
        assert_eq!(best.callsign, "W9XYZ");
    }

    #[tokio::test]
    async fn tried_and_spam_rows_are_excluded() {
        let store = InMemoryCandidateStore::default();
        let mut tried = sample_candidate(9.0);
        tried.tried = true;
        let key = CandidateKey { callsign: "W9XYZ".to_string(), band: 20, mode: Mode::Ft8 };
        store.upsert_candidate(&key, tried).await.unwrap();

        assert!(store.best_candidate(20, Mode::Ft8, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn take_candidate_removes_row() {
        let store = InMemoryCandidateStore::default();
        let key = CandidateKey { callsign: "W9XYZ".to_string(), band: 20, mode: Mode::Ft8 };
        store.upsert_candidate(&key, sample_candidate(1.0)).await.unwrap();

        assert!(store.take_candidate(&key).await.unwrap().is_some());
        assert!(store.take_candidate(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_band_mode_drops_only_matching_rows() {
        let store = InMemoryCandidateStore::default();
        let key20 = CandidateKey { callsign: "W9XYZ".to_string(), band: 20, mode: Mode::Ft8 };
        let key40 = CandidateKey { callsign: "W9XYZ".to_string(), band: 40, mode: Mode::Ft8 };
        store.upsert_candidate(&key20, sample_candidate(1.0)).await.unwrap();
        store.upsert_candidate(&key40, sample_candidate(1.0)).await.unwrap();

        store.clear_band_mode(20, Mode::Ft8).await.unwrap();

        assert!(store.take_candidate(&key20).await.unwrap().is_none());
        assert!(store.take_candidate(&key40).await.unwrap().is_some());
    }
}
