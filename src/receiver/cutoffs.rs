//! The three retirement checks `process_wsjt` applies to the matched
//! candidate the instant a transmission finishes: too many tries, too
//! long inactive, or transmitted so many times it looks like a stuck
//! loop rather than a live QSO.

use crate::model::Candidate;

/// Per-candidate cutoffs, falling back to the shared-state defaults when
/// a row carries no per-row override (`max_transmit_count`,
/// `num_inactive_before_cut` are always stamped on insert, so in practice
/// every row has one, but the fallback keeps this usable standalone).
#[derive(Debug, Clone, Copy)]
pub struct SlotCutoffs {
    pub max_tries: i64,
    pub num_inactive_before_cut: i64,
    pub max_transmit_count: i64,
}

/// What happened to a candidate after one transmit cycle completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffResult {
    pub tried: bool,
    pub expired: bool,
    pub is_spam: bool,
}

impl SlotCutoffs {
    /// `tries`/`inactive_count`/`transmit_counter` are the shared-state
    /// counters accumulated across the whole exchange with this
    /// candidate, not per-row fields.
    pub fn evaluate(&self, candidate: &Candidate, tries: i64, inactive_count: i64, transmit_counter: i64) -> CutoffResult {
        let mut tried = candidate.tried;
        let mut is_spam = candidate.is_spam;
        let mut expired = candidate.expired;

        if tries >= self.max_tries {
            tried = true;
        }
        if inactive_count > self.num_inactive_before_cut {
            expired = true;
        }
        if transmit_counter >= self.max_transmit_count {
            tried = true;
            is_spam = true;
        }

        CutoffResult { tried, expired, is_spam }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateType, Mode};

    fn candidate() -> Candidate {
        Candidate {
            callsign: "W9XYZ".to_string(),
            prefixed_callsign: "W9XYZ".to_string(),
            band: 20,
            mode: Mode::Ft8,
            message: String::new(),
            candidate_type: CandidateType::Snr,
            next_tx: CandidateType::Rsnr,
            snr: -10,
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
            importance: 2.0,
            tries: 0,
            max_transmit_count: 6,
            num_inactive_before_cut: 3,
            expired: false,
            tried: false,
            is_reemerging: false,
            is_spam: false,
            is_even: true,
            timestamp: 0.0,
        }
    }

    fn cutoffs() -> SlotCutoffs {
        SlotCutoffs { max_tries: 3, num_inactive_before_cut: 3, max_transmit_count: 6 }
    }

    #[test]
    fn under_every_threshold_stays_active() {
        let result = cutoffs().evaluate(&candidate(), 1, 1, 1);
        assert!(!result.tried && !result.expired && !result.is_spam);
    }

    #[test]
    fn max_tries_marks_tried_only() {
        let result = cutoffs().evaluate(&candidate(), 3, 0, 0);
        assert!(result.tried);
        assert!(!result.is_spam);
    }

    #[test]
    fn inactive_past_cutoff_expires() {
        let result = cutoffs().evaluate(&candidate(), 0, 4, 0);
        assert!(result.expired);
    }

    #[test]
    fn transmit_counter_past_double_max_tries_marks_spam() {
        let result = cutoffs().evaluate(&candidate(), 0, 0, 6);
        assert!(result.tried);
        assert!(result.is_spam);
    }
}
