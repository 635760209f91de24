//! Per-profile connection limiting
//!
//! Counters live in the shared store so the cap holds across worker
//! processes. Acquisition is increment-then-verify: the increment reserves
//! the slot atomically, and a reservation that lands over the cap is rolled
//! back before the error is reported. There is no check-then-act window.

use tracing::{debug, warn};

use crate::errors::{VodError, VodResult};
use crate::models::Profile;
use crate::store::{SharedStore, keys};

pub struct ProfileLimiter {
    store: SharedStore,
}

impl ProfileLimiter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Reserve a connection slot for this profile.
    ///
    /// A profile with `max_streams == 0` is unlimited and its counter is
    /// never touched.
    pub async fn try_acquire(&self, profile: &Profile) -> VodResult<()> {
        if profile.max_streams == 0 {
            return Ok(());
        }

        let key = keys::profile_connections(&profile.id);
        let reserved = self.store.incr(&key).await?;

        if reserved as u64 > profile.max_streams {
            let _ = self.store.decr(&key).await?;
            return Err(VodError::ProfileLimitExceeded {
                profile_name: profile.name.clone(),
                current: reserved.saturating_sub(1) as u64,
                max: profile.max_streams,
            });
        }

        debug!(
            profile_id = %profile.id,
            connections = reserved,
            max = profile.max_streams,
            "Profile slot acquired"
        );
        Ok(())
    }

    /// Return a previously acquired slot.
    ///
    /// Redundant releases are corrected back to zero and logged rather than
    /// letting the counter go negative and leak capacity.
    pub async fn release(&self, profile_id: &str) -> VodResult<()> {
        let key = keys::profile_connections(profile_id);
        let remaining = self.store.decr(&key).await?;
        if remaining < 0 {
            self.store.incr(&key).await?;
            warn!(
                profile_id = %profile_id,
                "Redundant profile slot release ignored"
            );
            return Ok(());
        }

        debug!(
            profile_id = %profile_id,
            connections = remaining,
            "Profile slot released"
        );
        Ok(())
    }

    /// Current connection count for a profile.
    pub async fn current(&self, profile_id: &str) -> VodResult<i64> {
        let key = keys::profile_connections(profile_id);
        Ok(self.store.counter(&key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn profile(max_streams: u64) -> Profile {
        Profile {
            id: "p1".to_string(),
            name: "test-profile".to_string(),
            max_streams,
            search_pattern: None,
            replace_pattern: None,
            user_agent_pattern: None,
            is_default: true,
        }
    }

    #[tokio::test]
    async fn enforces_cap_and_rolls_back_over_limit_reservation() {
        let limiter = ProfileLimiter::new(Arc::new(MemoryStore::new()));
        let p = profile(2);

        limiter.try_acquire(&p).await.unwrap();
        limiter.try_acquire(&p).await.unwrap();

        let err = limiter.try_acquire(&p).await.unwrap_err();
        assert!(matches!(
            err,
            VodError::ProfileLimitExceeded { current: 2, max: 2, .. }
        ));
        // the failed reservation must not consume a slot
        assert_eq!(limiter.current("p1").await.unwrap(), 2);

        limiter.release("p1").await.unwrap();
        limiter.try_acquire(&p).await.unwrap();
        assert_eq!(limiter.current("p1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unlimited_profile_never_touches_the_counter() {
        let limiter = ProfileLimiter::new(Arc::new(MemoryStore::new()));
        let p = profile(0);

        for _ in 0..50 {
            limiter.try_acquire(&p).await.unwrap();
        }
        assert_eq!(limiter.current("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn redundant_release_is_ignored() {
        let limiter = ProfileLimiter::new(Arc::new(MemoryStore::new()));
        let p = profile(2);

        limiter.try_acquire(&p).await.unwrap();
        limiter.release("p1").await.unwrap();
        limiter.release("p1").await.unwrap();
        assert_eq!(limiter.current("p1").await.unwrap(), 0);
        assert!(logs_contain("Redundant profile slot release ignored"));

        // a release that never decrements below zero keeps capacity intact
        limiter.try_acquire(&p).await.unwrap();
        limiter.try_acquire(&p).await.unwrap();
        assert!(limiter.try_acquire(&p).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_acquires_never_exceed_cap() {
        let limiter = Arc::new(ProfileLimiter::new(Arc::new(MemoryStore::new())));
        let p = profile(8);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let limiter = limiter.clone();
            let p = p.clone();
            tasks.push(tokio::spawn(async move {
                limiter.try_acquire(&p).await.is_ok()
            }));
        }

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 8);
        assert_eq!(limiter.current("p1").await.unwrap(), 8);
    }
}
