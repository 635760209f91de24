//! Cleanup sweeper
//!
//! Delayed cleanup handles the common case, but a worker can die between
//! scheduling and firing its grace timer. The sweeper is the backstop: a
//! periodic scan that reclaims any session with no active streams and no
//! recent activity. Teardown goes through the registry's claim-based
//! delete, so a sweep racing a grace timer releases each slot once.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::VodResult;
use crate::proxy::registry::SessionRegistry;

pub struct CleanupSweeper {
    registry: SessionRegistry,
    interval: Duration,
    max_age: Duration,
}

impl CleanupSweeper {
    pub fn new(registry: SessionRegistry, session_config: &SessionConfig) -> Self {
        Self {
            registry,
            interval: session_config.sweep_interval,
            max_age: session_config.session_max_age,
        }
    }

    /// Sweep forever. Spawned as a background task from `main`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the immediate first tick would sweep an empty store
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "Cleanup sweeper started"
        );
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(reclaimed) => info!(reclaimed, "Sweep reclaimed idle sessions"),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }
        }
    }

    /// One pass over every registered connection. Returns how many sessions
    /// were reclaimed.
    pub async fn sweep_once(&self) -> VodResult<usize> {
        let max_idle = self.max_age.as_secs() as i64;
        let mut reclaimed = 0;

        for session_id in self.registry.connection_ids().await? {
            // re-read right before deciding; another worker may have revived
            // the session since the scan
            let Some(state) = self.registry.load_state(&session_id).await? else {
                continue;
            };
            if state.active_stream_count > 0 {
                continue;
            }
            let idle = state.idle_seconds(Utc::now().timestamp());
            if idle < max_idle {
                continue;
            }

            debug!(session_id = %session_id, idle_secs = idle, "Reclaiming aged idle session");
            if self.registry.teardown(&session_id).await? {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
