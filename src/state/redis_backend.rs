//! Redis-backed [`KvBackend`], grounded on `states.py`'s use of a single
//! Redis database as the cross-process state store. We use `redis`'s
//! `ConnectionManager` rather than a bare `Connection` so a dropped
//! connection during a host reconnect gets re-established transparently
//! instead of failing every call until the process restarts.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{KvBackend, StateError};

pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(url: &str) -> Result<Self, StateError> {
        let client = redis::Client::open(url).map_err(|e| StateError::Backend { message: e.to_string() })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StateError::Backend { message: e.to_string() })?;
        Ok(RedisStateStore { conn })
    }
}

fn backend_err(e: redis::RedisError) -> StateError {
    StateError::Backend { message: e.to_string() }
}

#[async_trait]
impl KvBackend for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await.map_err(backend_err)
    }

    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StateError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.mget(keys).await.map_err(backend_err)
    }

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StateError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (key, value) in pairs {
            pipe.set(*key, value).ignore();
        }
        pipe.query_async(&mut conn).await.map_err(backend_err)
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StateError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1).await.map_err(backend_err)
    }

    async fn list_replace(&self, key: &str, values: &[String]) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.del(key).ignore();
        if !values.is_empty() {
            pipe.rpush(key, values).ignore();
        }
        pipe.query_async(&mut conn).await.map_err(backend_err)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.rpush(key, value).await.map_err(backend_err)
    }

    async fn flush(&self) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB").query_async(&mut conn).await.map_err(backend_err)
    }
}
