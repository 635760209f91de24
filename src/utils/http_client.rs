//! Upstream HTTP client construction
//!
//! Two clients with the same timeouts but different redirect policies. The
//! first request for a session follows redirects to discover the real media
//! URL; every later request hits that URL directly, so a redirect there
//! means the resolved URL went stale.

use reqwest::Client;
use reqwest::redirect::Policy;

use crate::config::UpstreamConfig;
use crate::errors::VodResult;

const REDIRECT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct UpstreamClients {
    following: Client,
    direct: Client,
}

impl UpstreamClients {
    pub fn new(config: &UpstreamConfig) -> VodResult<Self> {
        // connect/read timeouts only: a total request timeout would kill
        // long-running relays mid-movie
        let builder = || {
            Client::builder()
                .connect_timeout(config.connect_timeout)
                .read_timeout(config.read_timeout)
                .user_agent(config.user_agent.clone())
                .pool_max_idle_per_host(8)
        };

        Ok(Self {
            following: builder().redirect(Policy::limited(REDIRECT_LIMIT)).build()?,
            direct: builder().redirect(Policy::none()).build()?,
        })
    }

    /// Client used for first-request resolution.
    pub fn following(&self) -> &Client {
        &self.following
    }

    /// Client used once the final media URL is known.
    pub fn direct(&self) -> &Client {
        &self.direct
    }
}
