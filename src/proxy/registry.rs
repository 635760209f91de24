//! Session registry and connection lifecycle
//!
//! One `ConnectionState` exists per session id, shared across workers
//! through the store. Creation is serialized by a short-TTL lock so that
//! concurrent first requests from different workers produce a single
//! upstream connection. Whichever worker loses the lock adopts the winner's
//! state instead of creating its own.
//!
//! Teardown is claim-based: the worker whose delete actually removes the
//! connection key releases the profile slot, so a sweeper racing a grace
//! timer can never double-release.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, StoreConfig};
use crate::errors::{VodError, VodResult};
use crate::models::{ConnectionState, Profile, SessionRecord};
use crate::proxy::limiter::ProfileLimiter;
use crate::store::{SharedStore, keys};

#[derive(Clone)]
pub struct SessionRegistry {
    store: SharedStore,
    limiter: Arc<ProfileLimiter>,
    lock_ttl: Duration,
    lock_retries: u32,
    lock_retry_delay: Duration,
    cleanup_grace: Duration,
}

impl SessionRegistry {
    pub fn new(
        store: SharedStore,
        limiter: Arc<ProfileLimiter>,
        store_config: &StoreConfig,
        session_config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            lock_ttl: store_config.lock_ttl,
            lock_retries: store_config.lock_retries,
            lock_retry_delay: store_config.lock_retry_delay,
            cleanup_grace: session_config.cleanup_grace,
        }
    }

    pub fn limiter(&self) -> &ProfileLimiter {
        &self.limiter
    }

    /// Look up or create the connection state for a session.
    ///
    /// An existing session is touched and returned. Otherwise creation runs
    /// under the session lock: the winner reserves a profile slot and
    /// registers state, losers poll for that state and adopt it, and a
    /// loser that exhausts its retries without seeing state reports
    /// [`VodError::LockContended`].
    pub async fn open_session(
        &self,
        record: &SessionRecord,
        upstream_url: &str,
        profile: &Profile,
        request_headers: HashMap<String, String>,
    ) -> VodResult<ConnectionState> {
        let session_id = &record.session_id;

        if let Some(state) = self.load_state(session_id).await? {
            return self.touch_existing(state).await;
        }

        let lock_key = keys::connection_lock(session_id);
        for attempt in 0..=self.lock_retries {
            if self.store.try_lock(&lock_key, self.lock_ttl).await? {
                // a racing worker may have registered state between our read
                // and the lock grant
                let result = match self.load_state(session_id).await? {
                    Some(state) => self.touch_existing(state).await,
                    None => {
                        self.create_session(record, upstream_url, profile, &request_headers)
                            .await
                    }
                };
                self.store.unlock(&lock_key).await?;
                return result;
            }

            debug!(
                session_id = %session_id,
                attempt,
                "Session creation lock held elsewhere, polling for state"
            );
            tokio::time::sleep(self.lock_retry_delay).await;

            if let Some(state) = self.load_state(session_id).await? {
                return self.touch_existing(state).await;
            }
        }

        Err(VodError::LockContended {
            session_id: session_id.clone(),
        })
    }

    async fn create_session(
        &self,
        record: &SessionRecord,
        upstream_url: &str,
        profile: &Profile,
        request_headers: &HashMap<String, String>,
    ) -> VodResult<ConnectionState> {
        self.limiter.try_acquire(profile).await?;

        let mut state = ConnectionState::new(
            &record.session_id,
            upstream_url,
            &profile.id,
            request_headers.clone(),
        );
        state.slot_held = profile.max_streams > 0;
        state.request_count = 1;

        let conn_key = keys::persistent_connection(&record.session_id);
        if let Err(e) = self.store.put_hash(&conn_key, state.to_fields()).await {
            // do not leak the reserved slot when registration fails
            if state.slot_held {
                let _ = self.limiter.release(&profile.id).await;
            }
            return Err(e.into());
        }
        self.store
            .put_hash(&keys::session(&record.session_id), record.to_fields())
            .await?;

        info!(
            session_id = %record.session_id,
            profile_id = %profile.id,
            content = %record.content_name,
            "Session created"
        );
        Ok(state)
    }

    async fn touch_existing(&self, mut state: ConnectionState) -> VodResult<ConnectionState> {
        let now = Utc::now().timestamp();
        let conn_key = keys::persistent_connection(&state.session_id);
        let request_count = self
            .store
            .incr_hash_field(&conn_key, "request_count", 1)
            .await?;
        self.store
            .set_hash_fields(&conn_key, vec![("last_activity".into(), now.to_string())])
            .await?;
        self.store
            .set_hash_fields(
                &keys::session(&state.session_id),
                vec![("last_activity".into(), now.to_string())],
            )
            .await?;

        state.request_count = request_count.max(0) as u64;
        state.last_activity = now;
        debug!(
            session_id = %state.session_id,
            request_count,
            "Session reused"
        );
        Ok(state)
    }

    /// Record the outcome of the first upstream resolution.
    ///
    /// `final_url` and `content_length` are write-once: fields already set
    /// in the store win over the values passed here. Returns the state as
    /// stored afterwards.
    pub async fn record_resolution(
        &self,
        session_id: &str,
        final_url: Option<&str>,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> VodResult<ConnectionState> {
        let mut state = self
            .load_state(session_id)
            .await?
            .ok_or_else(|| VodError::invalid_request(format!("unknown session {session_id}")))?;

        let mut updates = Vec::new();
        if state.final_url.is_none() {
            if let Some(url) = final_url {
                updates.push(("final_url".to_string(), url.to_string()));
                state.final_url = Some(url.to_string());
            }
        }
        if state.content_length.is_none() {
            if let Some(length) = content_length {
                updates.push(("content_length".to_string(), length.to_string()));
                state.content_length = Some(length);
            }
        }
        if state.content_type.is_none() {
            if let Some(ct) = content_type {
                updates.push(("content_type".to_string(), ct.to_string()));
                state.content_type = Some(ct.to_string());
            }
        }

        if !updates.is_empty() {
            self.store
                .set_hash_fields(&keys::persistent_connection(session_id), updates)
                .await?;
        }
        Ok(state)
    }

    /// A relay task started pulling bytes for this session.
    pub async fn stream_started(&self, session_id: &str) -> VodResult<()> {
        let conn_key = keys::persistent_connection(session_id);
        self.store
            .incr_hash_field(&conn_key, "active_stream_count", 1)
            .await?;
        self.record_activity(session_id).await
    }

    /// A relay task finished (client done or disconnected). When the last
    /// one ends, teardown is scheduled after a grace period so an imminent
    /// seek can revive the session instead of paying for a reconnect.
    pub async fn stream_finished(&self, session_id: &str) -> VodResult<()> {
        let conn_key = keys::persistent_connection(session_id);
        let remaining = self
            .store
            .incr_hash_field(&conn_key, "active_stream_count", -1)
            .await?;
        if remaining < 0 {
            self.store
                .incr_hash_field(&conn_key, "active_stream_count", 1)
                .await?;
            warn!(session_id = %session_id, "Stream counter underflow corrected");
            return Ok(());
        }

        if remaining == 0 {
            self.schedule_delayed_cleanup(session_id);
        }
        Ok(())
    }

    /// Fold relayed bytes into the connection counters and refresh
    /// `last_activity`. Called on the relay's sampled cadence, not per chunk.
    pub async fn record_progress(&self, session_id: &str, bytes: u64) -> VodResult<()> {
        if bytes > 0 {
            self.store
                .incr_hash_field(
                    &keys::persistent_connection(session_id),
                    "bytes_served",
                    bytes as i64,
                )
                .await?;
        }
        self.record_activity(session_id).await
    }

    /// Refresh `last_activity` on both session hashes.
    pub async fn record_activity(&self, session_id: &str) -> VodResult<()> {
        let now = Utc::now().timestamp().to_string();
        self.store
            .set_hash_fields(
                &keys::persistent_connection(session_id),
                vec![("last_activity".into(), now.clone())],
            )
            .await?;
        self.store
            .set_hash_fields(
                &keys::session(session_id),
                vec![("last_activity".into(), now)],
            )
            .await?;
        Ok(())
    }

    fn schedule_delayed_cleanup(&self, session_id: &str) {
        let registry = self.clone();
        let session_id = session_id.to_string();
        let grace = self.cleanup_grace;
        let scheduled_at = Utc::now().timestamp();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let state = match registry.load_state(&session_id).await {
                Ok(Some(state)) => state,
                Ok(None) => return,
                Err(e) => {
                    warn!(session_id = %session_id, "Delayed cleanup read failed: {}", e);
                    return;
                }
            };

            // a request that arrived during the grace period revived the
            // session; leave it alone
            if state.active_stream_count > 0 || state.last_activity > scheduled_at {
                debug!(session_id = %session_id, "Session revived, skipping delayed cleanup");
                return;
            }

            if let Err(e) = registry.teardown(&session_id).await {
                warn!(session_id = %session_id, "Delayed cleanup failed: {}", e);
            }
        });
    }

    /// Remove a session and release its resources.
    ///
    /// Returns whether this call actually removed it. The profile slot is
    /// released only by the caller whose delete claimed the key.
    pub async fn teardown(&self, session_id: &str) -> VodResult<bool> {
        let state = self.load_state(session_id).await?;

        let conn_key = keys::persistent_connection(session_id);
        if !self.store.delete(&conn_key).await? {
            return Ok(false);
        }
        self.store.delete(&keys::session(session_id)).await?;

        if let Some(state) = state {
            if state.slot_held {
                self.limiter.release(&state.profile_id).await?;
            }
        }

        info!(session_id = %session_id, "Session torn down");
        Ok(true)
    }

    pub async fn load_state(&self, session_id: &str) -> VodResult<Option<ConnectionState>> {
        let key = keys::persistent_connection(session_id);
        match self.store.get_hash(&key).await? {
            Some(fields) => Ok(Some(ConnectionState::from_fields(&key, &fields)?)),
            None => Ok(None),
        }
    }

    pub async fn load_record(&self, session_id: &str) -> VodResult<Option<SessionRecord>> {
        let key = keys::session(session_id);
        match self.store.get_hash(&key).await? {
            Some(fields) => Ok(Some(SessionRecord::from_fields(&key, &fields)?)),
            None => Ok(None),
        }
    }

    /// All live sessions with their connection state, for the sessions API.
    pub async fn list_sessions(
        &self,
    ) -> VodResult<Vec<(SessionRecord, Option<ConnectionState>)>> {
        let mut sessions = Vec::new();
        for key in self.store.scan_keys(keys::SESSION_PATTERN).await? {
            let Some(session_id) = keys::session_id_from_session_key(&key) else {
                continue;
            };
            let Some(record) = self.load_record(session_id).await? else {
                continue;
            };
            let state = self.load_state(session_id).await?;
            sessions.push((record, state));
        }
        sessions.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(sessions)
    }

    /// Session ids of every persistent connection currently registered.
    pub async fn connection_ids(&self) -> VodResult<Vec<String>> {
        let keys_found = self
            .store
            .scan_keys(keys::PERSISTENT_CONNECTION_PATTERN)
            .await?;
        Ok(keys_found
            .iter()
            .filter_map(|k| keys::session_id_from_connection_key(k))
            .map(str::to_string)
            .collect())
    }
}
