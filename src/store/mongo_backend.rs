//! MongoDB-backed [`CandidateStore`], grounded on `receiver.py`'s
//! `call_coll`/`message_coll`/`grid_coll`/`done_coll` usage.

use async_trait::async_trait;
use bson::doc;
use mongodb::options::{FindOneAndReplaceOptions, FindOneOptions, ReplaceOptions};
use mongodb::{Collection, Database};

use crate::model::{BlacklistEntry, Candidate, GridHint, MessageHistory, Mode};

use super::{CandidateKey, CandidateStore, StoreError};

pub struct MongoCandidateStore {
    calls: Collection<Candidate>,
    messages: Collection<MessageHistory>,
    grids: Collection<GridHint>,
    blacklist: Collection<BlacklistEntry>,
}

impl MongoCandidateStore {
    /// `blacklist_collection` is named `black_<QRZ_USERNAME>` per operator,
    /// keeping one operator's worked-confirmed log out of another's.
    pub fn new(db: &Database, blacklist_collection: &str) -> Self {
        MongoCandidateStore {
            calls: db.collection("calls"),
            messages: db.collection("message"),
            grids: db.collection("grid"),
            blacklist: db.collection(blacklist_collection),
        }
    }
}

fn backend_err(e: mongodb::error::Error) -> StoreError {
    StoreError::Backend { message: e.to_string() }
}

fn candidate_filter(key: &CandidateKey) -> bson::Document {
    doc! { "callsign": &key.callsign, "band": key.band, "mode": key.mode.as_str() }
}

#[async_trait]
impl CandidateStore for MongoCandidateStore {
    async fn upsert_candidate(&self, key: &CandidateKey, candidate: Candidate) -> Result<(), StoreError> {
        self.calls
            .find_one_and_replace(candidate_filter(key), candidate, ReplaceOptions::builder().upsert(true).build())
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn take_candidate(&self, key: &CandidateKey) -> Result<Option<Candidate>, StoreError> {
        self.calls.find_one_and_delete(candidate_filter(key), None).await.map_err(backend_err)
    }

    async fn best_candidate(
        &self,
        band: i64,
        mode: Mode,
        is_even: Option<bool>,
    ) -> Result<Option<Candidate>, StoreError> {
        let mut filter = doc! {
            "band": band,
            "mode": mode.as_str(),
            "expired": false,
            "tried": false,
            "is_spam": false,
        };
        if let Some(parity) = is_even {
            filter.insert("is_even", parity);
        }
        let options = FindOneOptions::builder().sort(doc! { "importance": -1 }).build();
        self.calls.find_one(filter, options).await.map_err(backend_err)
    }

    async fn apply_cutoffs(
        &self,
        band: i64,
        mode: Mode,
        expired_before: f64,
        release_spam_before: f64,
    ) -> Result<u64, StoreError> {
        let expire_filter = doc! {
            "band": band, "mode": mode.as_str(), "expired": false, "importance": { "$lt": 2.0 },
            "timestamp": { "$lt": expired_before },
        };
        let release_filter = doc! {
            "band": band, "mode": mode.as_str(), "is_spam": true, "timestamp": { "$lt": release_spam_before },
        };
        let a = self
            .calls
            .update_many(expire_filter, doc! { "$set": { "expired": true } }, None)
            .await
            .map_err(backend_err)?;
        let b = self
            .calls
            .update_many(release_filter, doc! { "$set": { "is_spam": false } }, None)
            .await
            .map_err(backend_err)?;
        Ok(a.modified_count + b.modified_count)
    }

    async fn clear_band_mode(&self, band: i64, mode: Mode) -> Result<(), StoreError> {
        let filter = doc! { "band": band, "mode": mode.as_str() };
        self.calls.delete_many(filter.clone(), None).await.map_err(backend_err)?;
        self.messages.delete_many(filter, None).await.map_err(backend_err)?;
        Ok(())
    }

    async fn upsert_history(&self, history: MessageHistory) -> Result<(), StoreError> {
        let filter = doc! { "callsign": &history.callsign, "band": history.band, "mode": history.mode.as_str() };
        self.messages
            .find_one_and_replace(filter, history, FindOneAndReplaceOptions::builder().upsert(true).build())
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn history(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<MessageHistory>, StoreError> {
        let filter = doc! { "callsign": callsign, "band": band, "mode": mode.as_str() };
        self.messages.find_one(filter, None).await.map_err(backend_err)
    }

    async fn upsert_grid_hint(&self, hint: GridHint) -> Result<(), StoreError> {
        let filter = doc! { "callsign": &hint.callsign };
        self.grids
            .find_one_and_replace(filter, hint, FindOneAndReplaceOptions::builder().upsert(true).build())
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn grid_hint(&self, callsign: &str) -> Result<Option<GridHint>, StoreError> {
        self.grids.find_one(doc! { "callsign": callsign }, None).await.map_err(backend_err)
    }

    async fn blacklist_entry(&self, callsign: &str, band: i64, mode: Mode) -> Result<Option<BlacklistEntry>, StoreError> {
        let filter = doc! { "callsign": callsign, "band": band, "mode": mode.as_str() };
        self.blacklist.find_one(filter, None).await.map_err(backend_err)
    }

    async fn upsert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        let filter = doc! { "callsign": &entry.callsign, "band": entry.band, "mode": entry.mode.as_str() };
        self.blacklist
            .find_one_and_replace(filter, entry, FindOneAndReplaceOptions::builder().upsert(true).build())
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn release_stale_log_script(&self, before: f64) -> Result<u64, StoreError> {
        let filter = doc! { "log_script": true, "timestamp": { "$lte": before } };
        let result = self
            .blacklist
            .update_many(filter, doc! { "$set": { "log_script": false } }, None)
            .await
            .map_err(backend_err)?;
        Ok(result.modified_count)
    }
}
