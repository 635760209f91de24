//! Shared-store abstraction
//!
//! All cross-worker coordination flows through this seam: atomic counters
//! for profile limits, field hashes for session and connection state, and
//! short-TTL NX locks for session creation. The production backend is
//! [`RedisStore`]; [`MemoryStore`] serves single-process deployments and
//! tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::StoreResult;

pub mod keys;
pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Handle shared by every service that touches session state.
pub type SharedStore = Arc<dyn SessionStore>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> StoreResult<()>;

    /// Atomically increment a counter, returning the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Atomically decrement a counter, returning the new value. May go
    /// negative; callers that need a floor correct with [`Self::incr`].
    async fn decr(&self, key: &str) -> StoreResult<i64>;

    /// Current counter value (0 when absent).
    async fn counter(&self, key: &str) -> StoreResult<i64>;

    /// Replace a hash wholesale with the given fields.
    async fn put_hash(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()>;

    /// Read a whole hash; `None` when the key is absent.
    async fn get_hash(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>>;

    /// Update a subset of hash fields in place, leaving the rest untouched.
    async fn set_hash_fields(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()>;

    /// Atomically add `delta` to a numeric hash field, returning the result.
    async fn incr_hash_field(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Delete a key. Returns whether the key existed; when two workers race
    /// a teardown, exactly one of them sees `true`.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Take a mutex key if nobody holds it (SET NX EX semantics). Returns
    /// whether this caller won it. The TTL bounds how long a crashed holder
    /// can block others.
    async fn try_lock(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Release a held mutex key.
    async fn unlock(&self, key: &str) -> StoreResult<()>;

    /// All keys matching a glob pattern. Uses cursor-based scans, never a
    /// blocking full-keyspace read.
    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
}

/// Build the configured store backend.
pub async fn connect(config: &StoreConfig) -> anyhow::Result<SharedStore> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.redis_url).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
