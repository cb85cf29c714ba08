//! Scenario-level tests exercising the candidate store, transmitter
//! frequency search, and ADIF ingest together rather than one unit at a
//! time.

use ft8op::geo::{GeoLookup, LookupOutcome};
use ft8op::log_ingest::ingest_log;
use ft8op::model::{Candidate, CandidateType, Mode};
use ft8op::store::{CandidateKey, CandidateStore, InMemoryCandidateStore};
use ft8op::transmitter::Transmitter;

struct NullGeo;

#[async_trait::async_trait]
impl GeoLookup for NullGeo {
    async fn lookup(&self, _callsign: &str) -> LookupOutcome {
        LookupOutcome::NotFound
    }
}

fn candidate(callsign: &str, importance: f64, is_even: bool) -> Candidate {
    Candidate {
        callsign: callsign.to_string(),
        prefixed_callsign: callsign.to_string(),
        band: 20,
        mode: Mode::Ft8,
        message: format!("N0CALL {callsign} -10"),
        candidate_type: CandidateType::Snr,
        next_tx: CandidateType::Rsnr,
        snr: -10,
        time_ms: 0,
        delta_time: 0.2,
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
        max_transmit_count: 6,
        num_inactive_before_cut: 3,
        expired: false,
        tried: false,
        is_reemerging: false,
        is_spam: false,
        is_even,
        timestamp: 0.0,
    }
}

/// S2: a candidate flagged for one slot parity is invisible to a query
/// for the other parity, and visible again once parity matches.
#[tokio::test]
async fn slot_parity_flip_hides_then_reveals_candidate() {
    let store = InMemoryCandidateStore::default();
    let key = CandidateKey { callsign: "F5ZZZ".to_string(), band: 20, mode: Mode::Ft8 };
    store.upsert_candidate(&key, candidate("F5ZZZ", 2.0, true)).await.unwrap();

    assert!(store.best_candidate(20, Mode::Ft8, Some(false)).await.unwrap().is_none());
    assert!(store.best_candidate(20, Mode::Ft8, Some(true)).await.unwrap().is_some());
}

/// S3: past the spam transmit-count ceiling a candidate is marked tried
/// and spam, and the cutoff sweep later releases it once old enough.
#[tokio::test]
async fn spam_candidate_is_excluded_then_released_by_age_sweep() {
    let store = InMemoryCandidateStore::default();
    let key = CandidateKey { callsign: "F5ZZZ".to_string(), band: 20, mode: Mode::Ft8 };
    let mut spammed = candidate("F5ZZZ", 2.0, true);
    spammed.tried = true;
    spammed.is_spam = true;
    spammed.timestamp = 0.0;
    store.upsert_candidate(&key, spammed).await.unwrap();

    assert!(store.best_candidate(20, Mode::Ft8, None).await.unwrap().is_none());

    let touched = store.apply_cutoffs(20, Mode::Ft8, -1.0, 1_000_000.0).await.unwrap();
    assert_eq!(touched, 1);

    let released = store.take_candidate(&key).await.unwrap().unwrap();
    assert!(!released.is_spam);
}

/// S4: a band change sweep drops only the rows for the old band.
#[tokio::test]
async fn band_change_sweep_clears_only_old_band() {
    let store = InMemoryCandidateStore::default();
    let old_key = CandidateKey { callsign: "F5ZZZ".to_string(), band: 20, mode: Mode::Ft8 };
    let new_key = CandidateKey { callsign: "F5ZZZ".to_string(), band: 40, mode: Mode::Ft8 };
    store.upsert_candidate(&old_key, candidate("F5ZZZ", 2.0, true)).await.unwrap();
    store.upsert_candidate(&new_key, candidate("F5ZZZ", 2.0, true)).await.unwrap();

    store.clear_band_mode(20, Mode::Ft8).await.unwrap();

    assert!(store.take_candidate(&old_key).await.unwrap().is_none());
    assert!(store.take_candidate(&new_key).await.unwrap().is_some());
}

/// S5: two confirmed records and one unconfirmed record, with
/// `WORK_ON_UNCONFIRMED_QSO=true` meaning the unconfirmed one is still
/// worth a blacklist row rather than being filtered out.
#[tokio::test]
async fn adif_ingest_parses_mixed_confirmation_batch() {
    let adif = concat!(
        "<call:5>K1ABC<band:3>20m<mode:3>FT8<app_qrzlog_status:1>C<eor>",
        "<call:5>W9XYZ<band:3>20m<mode:3>FT8<app_qrzlog_status:1>C<eor>",
        "<call:5>N0AAA<band:3>20m<mode:3>FT4<app_qrzlog_status:1>N",
        "<lotw_qsl_sent:1>N<lotw_qsl_rcvd:1>N<eor>",
    );
    let store = InMemoryCandidateStore::default();
    let written = ingest_log(&store, &NullGeo, adif, true, 0.0).await.unwrap();
    assert_eq!(written, 3);

    assert!(store.blacklist_entry("K1ABC", 20, Mode::Ft8).await.unwrap().is_some());
    assert!(store.blacklist_entry("W9XYZ", 20, Mode::Ft8).await.unwrap().is_some());
    let unconfirmed = store.blacklist_entry("N0AAA", 20, Mode::Ft4).await.unwrap().unwrap();
    assert!(!unconfirmed.confirmed);
}

/// S6: even list = {1500, 1520, 1700, 2200}, odd list = {1500, 1800,
/// 2200}. A reply issued during an odd slot for an even-flagged QSO
/// reads the even list; the widest gap there is 1700..2200.
#[tokio::test]
async fn best_frequency_picks_widest_gap_from_correct_parity_list() {
    let even = vec![1500, 1520, 1700, 2200];
    let best = Transmitter::<InMemoryCandidateStore>::calculate_best_frequency(&even);
    assert_eq!(best, 1950);
}
