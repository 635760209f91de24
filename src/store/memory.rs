//! In-memory store backend
//!
//! Single-process stand-in for redis, used for development deployments
//! without a redis instance and throughout the test suite. Lock keys carry
//! real expiries so lock-contention behavior matches the redis backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::errors::StoreResult;

#[derive(Default)]
struct Inner {
    counters: HashMap<String, i64>,
    hashes: HashMap<String, HashMap<String, String>>,
    locks: HashMap<String, Instant>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Single-`*` glob match, which covers every pattern the key schema uses.
fn glob_matches(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
        None => pattern == key,
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn decr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        *value -= 1;
        Ok(*value)
    }

    async fn counter(&self, key: &str) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.counters.get(key).copied().unwrap_or(0))
    }

    async fn put_hash(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.hashes.insert(key.to_string(), fields.into_iter().collect());
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        let inner = self.inner.read().await;
        Ok(inner.hashes.get(key).cloned())
    }

    async fn set_hash_fields(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field, value);
        }
        Ok(())
    }

    async fn incr_hash_field(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        let current: i64 = hash.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
        let updated = current + delta;
        hash.insert(field.to_string(), updated.to_string());
        Ok(updated)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let had_counter = inner.counters.remove(key).is_some();
        let had_hash = inner.hashes.remove(key).is_some();
        Ok(had_counter || had_hash)
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        if let Some(expiry) = inner.locks.get(key) {
            if *expiry > now {
                return Ok(false);
            }
        }
        inner.locks.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn unlock(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.locks.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner
            .hashes
            .keys()
            .chain(inner.counters.keys())
            .filter(|k| glob_matches(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
