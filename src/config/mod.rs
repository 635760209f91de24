//! Application configuration
//!
//! Configuration is read from a TOML file merged with `VOD_PROXY_*`
//! environment variable overrides. Every field has a usable default so the
//! service starts with an empty file; a missing config file is created with
//! the defaults on first run.

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod duration_serde;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which shared-store backend coordinates the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Production: state shared across worker processes via redis.
    Redis,
    /// Single-process in-memory state for development and tests.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// TTL on the session-creation lock key. A worker that dies mid-create
    /// releases the session implicitly when this expires.
    #[serde(with = "duration_serde::duration", default = "default_lock_ttl")]
    pub lock_ttl: Duration,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(with = "duration_serde::duration", default = "default_lock_retry_delay")]
    pub lock_retry_delay: Duration,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_lock_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_lock_retries() -> u32 {
    5
}

fn default_lock_retry_delay() -> Duration {
    Duration::from_millis(200)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            lock_ttl: default_lock_ttl(),
            lock_retries: default_lock_retries(),
            lock_retry_delay: default_lock_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(with = "duration_serde::duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_serde::duration", default = "default_read_timeout")]
    pub read_timeout: Duration,
    /// User-Agent sent upstream when the client supplied none.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("vod-proxy/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Persist activity every N relayed chunks rather than per chunk.
    #[serde(default = "default_activity_sample_chunks")]
    pub activity_sample_chunks: u64,
    /// Grace period between the last client disconnecting and teardown.
    #[serde(with = "duration_serde::duration", default = "default_cleanup_grace")]
    pub cleanup_grace: Duration,
    /// How often the sweeper scans for stale sessions.
    #[serde(with = "duration_serde::duration", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    /// Idle sessions older than this are reclaimed by the sweeper.
    #[serde(with = "duration_serde::duration", default = "default_session_max_age")]
    pub session_max_age: Duration,
}

fn default_chunk_size() -> usize {
    8192
}

fn default_activity_sample_chunks() -> u64 {
    64
}

fn default_cleanup_grace() -> Duration {
    Duration::from_secs(8)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_session_max_age() -> Duration {
    Duration::from_secs(1800)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            activity_sample_chunks: default_activity_sample_chunks(),
            cleanup_grace: default_cleanup_grace(),
            sweep_interval: default_sweep_interval(),
            session_max_age: default_session_max_age(),
        }
    }
}

/// Static catalog entries, used by the bundled [`crate::catalog::StaticCatalog`].
///
/// Real deployments replace the static catalog behind the same traits; these
/// sections then stay empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub id: String,
    pub name: String,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_streams: u64,
    /// Optional regex rewrite applied to upstream URLs for this profile.
    pub search_pattern: Option<String>,
    pub replace_pattern: Option<String>,
    /// Requests whose User-Agent matches this regex prefer this profile.
    pub user_agent_pattern: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub id: String,
    pub name: String,
    /// One of `movie`, `episode`, `series`.
    pub kind: String,
    /// Upstream URL; absent for `series` entries, which list episodes instead.
    pub url: Option<String>,
    /// Episode content ids in play order, first entry is the series default.
    #[serde(default)]
    pub episodes: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !std::path::Path::new(&config_file).exists() {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Config = Figment::new()
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("VOD_PROXY_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.web.port, 8085);
        assert_eq!(config.session.chunk_size, 8192);
        assert_eq!(config.session.session_max_age, Duration::from_secs(1800));
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn parses_partial_toml_with_durations() {
        let toml_str = r#"
            [session]
            cleanup_grace = "15s"
            session_max_age = "1h"

            [store]
            backend = "memory"

            [[catalog.profiles]]
            id = "p1"
            name = "default"
            max_streams = 3
            is_default = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.cleanup_grace, Duration::from_secs(15));
        assert_eq!(config.session.session_max_age, Duration::from_secs(3600));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.catalog.profiles.len(), 1);
        assert_eq!(config.catalog.profiles[0].max_streams, 3);
        // untouched sections keep their defaults
        assert_eq!(config.upstream.connect_timeout, Duration::from_secs(10));
    }
}
