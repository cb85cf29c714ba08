//! Geolocation lookups for a callsign: country/continent/DXCC and, when
//! available, a Maidenhead grid derived from a lat/long pair. The Python
//! original leans on `pyhamtools.Callinfo` and swallows every lookup
//! failure with a bare `except`; we make that failure a first-class
//! three-way result instead of a caught exception.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use snafu::Snafu;

#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub country: String,
    pub continent: String,
    pub dxcc: i64,
    pub state: Option<String>,
    pub county: Option<String>,
    pub grid: Option<String>,
}

#[derive(Debug, Snafu)]
pub enum GeoError {
    #[snafu(display("geolocation backend unavailable: {message}"))]
    Transient { message: String },
}

/// The three outcomes a lookup can settle into. Replaces the original's
/// `try/except` around an unreliable callsign-lookup library: "the
/// callsign genuinely isn't in any prefix table" must not be treated the
/// same as "the lookup service hiccuped and should be retried".
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Ok(GeoInfo),
    NotFound,
    Transient(String),
}

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, callsign: &str) -> LookupOutcome;
}

/// Wraps a callsign-prefix table kept in memory (loaded once at startup,
/// the way `LookupLib(filename='data/cty.plist')` is loaded once).
pub struct PrefixTableLookup {
    table: HashMap<String, GeoInfo>,
}

impl PrefixTableLookup {
    pub fn new(table: HashMap<String, GeoInfo>) -> Self {
        PrefixTableLookup { table }
    }

    fn longest_prefix_match(&self, callsign: &str) -> Option<&GeoInfo> {
        let upper = callsign.to_uppercase();
        (1..=upper.len())
            .rev()
            .find_map(|len| self.table.get(&upper[..len]))
    }
}

#[async_trait]
impl GeoLookup for PrefixTableLookup {
    async fn lookup(&self, callsign: &str) -> LookupOutcome {
        match self.longest_prefix_match(callsign) {
            Some(info) => LookupOutcome::Ok(info.clone()),
            None => LookupOutcome::NotFound,
        }
    }
}

/// Caches successful and not-found results; a transient failure is never
/// cached so the next decode retries the backend.
pub struct CachedGeoLookup<L: GeoLookup> {
    inner: L,
    cache: Mutex<LruCache<String, Option<GeoInfo>>>,
}

impl<L: GeoLookup> CachedGeoLookup<L> {
    pub fn new(inner: L, capacity: usize) -> Self {
        CachedGeoLookup {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }
}

#[async_trait]
impl<L: GeoLookup> GeoLookup for CachedGeoLookup<L> {
    async fn lookup(&self, callsign: &str) -> LookupOutcome {
        let key = callsign.to_uppercase();
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            return match hit {
                Some(info) => LookupOutcome::Ok(info.clone()),
                None => LookupOutcome::NotFound,
            };
        }

        match self.inner.lookup(callsign).await {
            LookupOutcome::Ok(info) => {
                self.cache.lock().unwrap().put(key, Some(info.clone()));
                LookupOutcome::Ok(info)
            }
            LookupOutcome::NotFound => {
                self.cache.lock().unwrap().put(key, None);
                LookupOutcome::NotFound
            }
            transient => transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> HashMap<String, GeoInfo> {
        let mut table = HashMap::new();
        table.insert(
            "K".to_string(),
            GeoInfo {
                country: "United States".to_string(),
                continent: "NA".to_string(),
                dxcc: 291,
                state: None,
                county: None,
                grid: None,
            },
        );
        table
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let lookup = PrefixTableLookup::new(sample_table());
        match lookup.lookup("K1ABC").await {
            LookupOutcome::Ok(info) => assert_eq!(info.country, "United States"),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_prefix_is_not_found() {
        let lookup = PrefixTableLookup::new(sample_table());
        assert_eq!(lookup.lookup("ZZ1ZZZ").await, LookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn cache_remembers_not_found() {
        let cached = CachedGeoLookup::new(PrefixTableLookup::new(sample_table()), 10);
        assert_eq!(cached.lookup("ZZ1ZZZ").await, LookupOutcome::NotFound);
        assert_eq!(cached.lookup("ZZ1ZZZ").await, LookupOutcome::NotFound);
    }
}
