//! Shared state shared between the receiver and transmitter loops: WSJT-X
//! connection parameters, live counters, and the two per-parity frequency
//! lists the transmitter's best-frequency search reads from.
//!
//! Grounded on `states.py`'s `States` class: one KV row per named field,
//! batched get/set through a pipeline. We keep that shape (an async
//! trait object backend, typed accessors above it) rather than modelling
//! it as a single shared struct, because the receiver and transmitter run
//! as independent tasks and a crash of either must not lose the other's
//! view of where things stood.

mod redis_backend;

use async_trait::async_trait;
use snafu::Snafu;

pub use redis_backend::RedisStateStore;

#[derive(Debug, Snafu)]
pub enum StateError {
    #[snafu(display("shared state backend error: {message}"))]
    Backend { message: String },
}

/// The minimal KV operations the typed [`SharedState`] accessors compile
/// down to. An implementation only needs string get/set and list
/// operations; `SharedState` owns all typing and defaults.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StateError>;
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StateError>;
    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StateError>;
    async fn list(&self, key: &str) -> Result<Vec<String>, StateError>;
    async fn list_replace(&self, key: &str, values: &[String]) -> Result<(), StateError>;
    async fn list_push(&self, key: &str, value: &str) -> Result<(), StateError>;
    async fn flush(&self) -> Result<(), StateError>;
}

/// Typed view over a [`KvBackend`], mirroring `states.py`'s property list.
pub struct SharedState {
    backend: Box<dyn KvBackend>,
}

macro_rules! string_field {
    ($get:ident, $set:ident, $key:expr) => {
        pub async fn $get(&self) -> Result<String, StateError> {
            Ok(self.backend.get($key).await?.unwrap_or_default())
        }
        pub async fn $set(&self, val: &str) -> Result<(), StateError> {
            self.backend.set($key, val).await
        }
    };
}

macro_rules! int_field {
    ($get:ident, $set:ident, $key:expr) => {
        pub async fn $get(&self) -> Result<i64, StateError> {
            Ok(self
                .backend
                .get($key)
                .await?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0))
        }
        pub async fn $set(&self, val: i64) -> Result<(), StateError> {
            self.backend.set($key, &val.to_string()).await
        }
    };
}

macro_rules! bool_field {
    ($get:ident, $set:ident, $key:expr) => {
        pub async fn $get(&self) -> Result<bool, StateError> {
            Ok(self.backend.get($key).await?.map(|v| v == "1").unwrap_or(false))
        }
        pub async fn $set(&self, val: bool) -> Result<(), StateError> {
            self.backend.set($key, if val { "1" } else { "" }).await
        }
    };
}

impl SharedState {
    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        SharedState { backend }
    }

    string_field!(ip, set_ip, "ip");
    int_field!(port, set_port, "port");
    string_field!(my_callsign, set_my_callsign, "my_callsign");
    string_field!(my_grid, set_my_grid, "my_grid");
    string_field!(dx_callsign, set_dx_callsign, "dx_callsign");
    string_field!(dx_grid, set_dx_grid, "dx_grid");
    int_field!(band, set_band, "band");
    string_field!(mode, set_mode, "mode");
    bool_field!(tx_enabled, set_tx_enabled, "tx_enabled");
    bool_field!(transmitting, set_transmitting, "transmitting");
    bool_field!(decoding, set_decoding, "decoding");
    bool_field!(closed, set_closed, "closed");
    int_field!(rxdf, set_rxdf, "rxdf");
    int_field!(txdf, set_txdf, "txdf");
    string_field!(last_tx, set_last_tx, "last_tx");
    bool_field!(tx_even, set_tx_even, "tx_even");

    bool_field!(transmitter_started, set_transmitter_started, "transmitter_started");
    bool_field!(receiver_started, set_receiver_started, "receiver_started");
    bool_field!(transmit_phase, set_transmit_phase, "transmit_phase");
    string_field!(current_callsign, set_current_callsign, "current_callsign");
    int_field!(inactive_count, set_inactive_count, "inactive_count");
    int_field!(tries, set_tries, "tries");
    int_field!(transmit_counter, set_transmit_counter, "transmit_counter");
    int_field!(enable_transmit_counter, set_enable_transmit_counter, "enable_transmit_counter");

    int_field!(num_inactive_before_cut, set_num_inactive_before_cut, "num_inactive_before_cut");
    int_field!(num_tries_call_busy, set_num_tries_call_busy, "num_tries_call_busy");
    int_field!(num_disable_transmit, set_num_disable_transmit, "num_disable_transmit");
    int_field!(max_tries, set_max_tries, "max_tries");
    int_field!(max_tries_change_freq, set_max_tries_change_freq, "max_tries_change_freq");
    int_field!(min_db, set_min_db, "min_db");
    bool_field!(new_grid, set_new_grid, "new_grid");
    bool_field!(new_dxcc, set_new_dxcc, "new_dxcc");
    int_field!(initial_frequency, set_initial_frequency, "initial_frequency");

    pub async fn odd_frequencies(&self) -> Result<Vec<i64>, StateError> {
        self.int_list("odd_frequencies").await
    }
    pub async fn even_frequencies(&self) -> Result<Vec<i64>, StateError> {
        self.int_list("even_frequencies").await
    }
    pub async fn set_odd_frequencies(&self, values: &[i64]) -> Result<(), StateError> {
        self.set_int_list("odd_frequencies", values).await
    }
    pub async fn set_even_frequencies(&self, values: &[i64]) -> Result<(), StateError> {
        self.set_int_list("even_frequencies", values).await
    }
    pub async fn add_odd_frequency(&self, value: i64) -> Result<(), StateError> {
        self.backend.list_push("odd_frequencies", &value.to_string()).await
    }
    pub async fn add_even_frequency(&self, value: i64) -> Result<(), StateError> {
        self.backend.list_push("even_frequencies", &value.to_string()).await
    }

    async fn int_list(&self, key: &str) -> Result<Vec<i64>, StateError> {
        Ok(self.backend.list(key).await?.iter().filter_map(|v| v.parse().ok()).collect())
    }
    async fn set_int_list(&self, key: &str, values: &[i64]) -> Result<(), StateError> {
        let strs: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.backend.list_replace(key, &strs).await
    }

    pub async fn flush(&self) -> Result<(), StateError> {
        self.backend.flush().await
    }
}

/// In-process backend for tests: no network, no persistence.
#[derive(Default)]
pub struct MockKvBackend {
    strings: std::sync::Mutex<std::collections::HashMap<String, String>>,
    lists: std::sync::Mutex<std::collections::HashMap<String, Vec<String>>>,
}

#[async_trait]
impl KvBackend for MockKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.strings.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StateError> {
        let map = self.strings.lock().unwrap();
        Ok(keys.iter().map(|k| map.get(*k).cloned()).collect())
    }

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StateError> {
        let mut map = self.strings.lock().unwrap();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StateError> {
        Ok(self.lists.lock().unwrap().get(key).cloned().unwrap_or_default())
    }

    async fn list_replace(&self, key: &str, values: &[String]) -> Result<(), StateError> {
        self.lists.lock().unwrap().insert(key.to_string(), values.to_vec());
        Ok(())
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.lists.lock().unwrap().entry(key.to_string()).or_default().push(value.to_string());
        Ok(())
    }

    async fn flush(&self) -> Result<(), StateError> {
        self.strings.lock().unwrap().clear();
        self.lists.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_state() -> SharedState {
        SharedState::new(Box::new(MockKvBackend::default()))
    }

    #[tokio::test]
    async fn bool_fields_default_false() {
        let state = mock_state();
        assert!(!state.transmitting().await.unwrap());
    }

    #[tokio::test]
    async fn bool_round_trips() {
        let state = mock_state();
        state.set_transmitting(true).await.unwrap();
        assert!(state.transmitting().await.unwrap());
    }

    #[tokio::test]
    async fn frequency_lists_round_trip() {
        let state = mock_state();
        state.set_even_frequencies(&[1500, 1600]).await.unwrap();
        state.add_even_frequency(1800).await.unwrap();
        assert_eq!(state.even_frequencies().await.unwrap(), vec![1500, 1600, 1800]);
    }

    #[tokio::test]
    async fn int_field_defaults_to_zero() {
        let state = mock_state();
        assert_eq!(state.tries().await.unwrap(), 0);
    }
}
