//! The "already talking with me" and "already spammed" checks that
//! `receiver.py` repeats almost verbatim across its GRID/SNR/RSNR/R73
//! (and, with a slightly different condition order, CQ) branches before
//! falling through to the type-specific filter. Factored into one helper
//! here instead of four copies.

use crate::model::Candidate;
use crate::textmsg::ParsedMessage;

/// What to do instead of normal processing, when a guard fires.
pub struct GuardHit {
    /// The row to put back in the `calls` collection unchanged (or
    /// re-flagged as reemerging), if any.
    pub reinsert: Option<Candidate>,
}

/// Returns `Some(..)` when this decode should short-circuit normal
/// processing: either the previous row for this callsign was already
/// addressed to us and unfinished (the "already talking with me" guard),
/// or the previous row was already flagged spam for the same next-tx type
/// (the "already spammed" guard).
pub fn reemerging_or_spam(parsed: &ParsedMessage, previous: Option<&Candidate>, my_callsign: &str) -> Option<GuardHit> {
    let previous = previous?;

    if previous.is_spam && previous.next_tx == parsed.candidate_type {
        return Some(GuardHit { reinsert: Some(previous.clone()) });
    }

    let unfinished = previous.next_tx != crate::model::CandidateType::R73 || !previous.tried;

    if previous.addressed_to_us && unfinished && parsed.candidate_type != crate::model::CandidateType::Cq {
        if previous.tried && previous.next_tx == crate::model::CandidateType::R73 {
            return Some(GuardHit { reinsert: None });
        }
        let mut reemerging = previous.clone();
        reemerging.is_reemerging = true;
        return Some(GuardHit { reinsert: Some(reemerging) });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateType, Mode};

    fn base_candidate() -> Candidate {
        Candidate {
            callsign: "W9XYZ".to_string(),
            prefixed_callsign: "W9XYZ".to_string(),
            band: 20,
            mode: Mode::Ft8,
            message: String::new(),
            candidate_type: CandidateType::Grid,
            next_tx: CandidateType::Snr,
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

    fn grid_message() -> ParsedMessage {
        ParsedMessage {
            candidate_type: CandidateType::Grid,
            callsign: crate::model::Callsign::plain("W9XYZ"),
            to: Some(crate::model::Callsign::plain("K1ABC")),
            extra: None,
            grid: Some("EM10".to_string()),
            snr: None,
            r73_token: None,
        }
    }

    #[test]
    fn no_previous_row_never_triggers_a_guard() {
        assert!(reemerging_or_spam(&grid_message(), None, "K1ABC").is_none());
    }

    #[test]
    fn unfinished_exchange_addressed_to_us_reemerges() {
        let previous = base_candidate();
        let hit = reemerging_or_spam(&grid_message(), Some(&previous), "K1ABC").unwrap();
        assert!(hit.reinsert.unwrap().is_reemerging);
    }

    #[test]
    fn completed_r73_exchange_is_dropped_not_reinserted() {
        let mut previous = base_candidate();
        previous.next_tx = CandidateType::R73;
        previous.tried = true;
        let hit = reemerging_or_spam(&grid_message(), Some(&previous), "K1ABC").unwrap();
        assert!(hit.reinsert.is_none());
    }

    #[test]
    fn already_spammed_same_type_is_reinserted_unchanged() {
        let mut previous = base_candidate();
        previous.is_spam = true;
        previous.next_tx = CandidateType::Grid;
        let mut msg = grid_message();
        msg.candidate_type = CandidateType::Grid;
        let hit = reemerging_or_spam(&msg, Some(&previous), "K1ABC").unwrap();
        assert_eq!(hit.reinsert.unwrap().callsign, "W9XYZ");
    }
}
