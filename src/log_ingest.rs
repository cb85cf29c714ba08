//! Bulk ADIF ingest run once at startup: turns an existing log into
//! blacklist rows so the receiver treats those stations as already
//! worked instead of re-discovering them on the air.
//!
//! Grounded on `original_source/adif_parser.py`'s `main`. The HTTP fetch
//! it wraps around that function is out of scope here; this operates on
//! ADIF text already in hand, however it was obtained.

use tracing::warn;

use crate::adif::{read_from_string, AdifError};
use crate::geo::{GeoLookup, LookupOutcome};
use crate::model::{BlacklistEntry, Mode};
use crate::store::CandidateStore;

/// Parses `adif`, keeps only FT4/FT8 records, applies the confirmation
/// gate (`work_on_unconfirmed_qso`), and upserts a blacklist row per
/// surviving record. Returns the number of rows written.
pub async fn ingest_log<S: CandidateStore, G: GeoLookup>(
    store: &S,
    geo: &G,
    adif: &str,
    work_on_unconfirmed_qso: bool,
    now: f64,
) -> Result<u64, AdifError> {
    let records = read_from_string(adif)?;
    let mut written = 0u64;

    for record in records {
        let Some(mode) = record.mode().and_then(Mode::from_str) else { continue };
        let confirmed = record.is_confirmed();
        if !confirmed && !work_on_unconfirmed_qso {
            continue;
        }
        let Some(callsign) = record.callsign() else { continue };
        let Some(band) = record.band_meters() else { continue };

        let geo_info = match geo.lookup(callsign).await {
            LookupOutcome::Ok(info) => Some(info),
            LookupOutcome::NotFound => None,
            LookupOutcome::Transient(reason) => {
                warn!(reason = %reason, %callsign, "geolocation lookup failed during log ingest");
                None
            }
        };

        let entry = BlacklistEntry {
            callsign: callsign.to_string(),
            band,
            mode,
            confirmed,
            log_script: false,
            from_script: false,
            timestamp: record.logged_timestamp().unwrap_or(now),
            grid: record.grid().map(String::from).or_else(|| geo_info.as_ref().and_then(|g| g.grid.clone())),
            country: geo_info.as_ref().map(|g| g.country.clone()),
            continent: geo_info.as_ref().map(|g| g.continent.clone()),
            dxcc: geo_info.as_ref().map(|g| g.dxcc),
            state: geo_info.as_ref().and_then(|g| g.state.clone()),
            county: geo_info.as_ref().and_then(|g| g.county.clone()),
            qso_id: record.qso_id_from_dates(),
        };
        store.upsert_blacklist_entry(entry).await.ok();
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCandidateStore;

    struct NullGeo;

    #[async_trait::async_trait]
    impl GeoLookup for NullGeo {
        async fn lookup(&self, _callsign: &str) -> LookupOutcome {
            LookupOutcome::NotFound
        }
    }

    fn mixed_batch() -> &'static str {
        concat!(
            "<call:5>K1ABC<band:3>20m<mode:3>FT8<app_qrzlog_status:1>C<eor>",
            "<call:5>W9XYZ<band:3>20m<mode:3>FT8<app_qrzlog_status:1>C<eor>",
            "<call:5>N0AAA<band:3>20m<mode:3>FT4<app_qrzlog_status:1>N",
            "<lotw_qsl_sent:1>N<lotw_qsl_rcvd:1>N<eor>",
        )
    }

    #[tokio::test]
    async fn work_on_unconfirmed_keeps_all_three_records() {
        let store = InMemoryCandidateStore::default();
        let written = ingest_log(&store, &NullGeo, mixed_batch(), true, 0.0).await.unwrap();
        assert_eq!(written, 3);
        assert!(store.blacklist_entry("K1ABC", 20, Mode::Ft8).await.unwrap().is_some());
        assert!(store.blacklist_entry("W9XYZ", 20, Mode::Ft8).await.unwrap().is_some());
        assert!(store.blacklist_entry("N0AAA", 20, Mode::Ft4).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn without_work_on_unconfirmed_only_confirmed_records_land() {
        let store = InMemoryCandidateStore::default();
        let written = ingest_log(&store, &NullGeo, mixed_batch(), false, 0.0).await.unwrap();
        assert_eq!(written, 2);
        assert!(store.blacklist_entry("N0AAA", 20, Mode::Ft4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_ft_modes_are_skipped() {
        let store = InMemoryCandidateStore::default();
        let adif = "<call:5>K1ABC<band:3>20m<mode:3>SSB<eor>";
        let written = ingest_log(&store, &NullGeo, adif, true, 0.0).await.unwrap();
        assert_eq!(written, 0);
    }
}
