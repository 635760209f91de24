//! Shared data models
//!
//! The persisted types (`ConnectionState`, `SessionRecord`) round-trip
//! through string field maps because they live in shared-store hashes where
//! individual fields are updated in place by whichever worker touches the
//! session. The collaborator-shaped types (`Profile`, `ContentDescriptor`)
//! mirror what the catalog traits hand back.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};

/// What kind of on-demand content a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Episode,
    Series,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Movie => write!(f, "movie"),
            ContentKind::Episode => write!(f, "episode"),
            ContentKind::Series => write!(f, "series"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentKind::Movie),
            "episode" => Ok(ContentKind::Episode),
            "series" => Ok(ContentKind::Series),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

/// Catalog entry resolved for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ContentKind,
}

/// Account profile: a named upstream identity with a concurrency cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Maximum concurrent connections; 0 means unlimited.
    pub max_streams: u64,
    pub search_pattern: Option<String>,
    pub replace_pattern: Option<String>,
    pub user_agent_pattern: Option<String>,
    pub is_default: bool,
}

/// Timeshift/catchup parameters carried on a VOD request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeshiftParams {
    /// ISO-8601 window start, e.g. `2023-01-01T12:00:00Z`.
    pub utc_start: Option<String>,
    /// ISO-8601 window end.
    pub utc_end: Option<String>,
    /// Seek offset in seconds.
    pub offset: Option<u64>,
}

impl TimeshiftParams {
    pub fn is_empty(&self) -> bool {
        self.utc_start.is_none() && self.utc_end.is_none() && self.offset.is_none()
    }
}

/// Persistent upstream connection state, one hash per session id.
///
/// `final_url` and `content_length` are write-once: the first successful
/// upstream resolution fills them and later requests reuse them, so a seek
/// never repeats the provider's redirect chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub session_id: String,
    pub upstream_url: String,
    pub final_url: Option<String>,
    pub request_headers: HashMap<String, String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub active_stream_count: u64,
    pub request_count: u64,
    /// Total bytes relayed to clients, updated on the sampled cadence.
    pub bytes_served: u64,
    pub profile_id: String,
    /// Whether a capped profile slot is reserved for this session.
    /// Unlimited profiles never touch the counter, so teardown must not
    /// decrement it for them.
    pub slot_held: bool,
    pub created_at: i64,
    pub last_activity: i64,
}

impl ConnectionState {
    pub fn new(
        session_id: &str,
        upstream_url: &str,
        profile_id: &str,
        request_headers: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            session_id: session_id.to_string(),
            upstream_url: upstream_url.to_string(),
            final_url: None,
            request_headers,
            content_length: None,
            content_type: None,
            active_stream_count: 0,
            request_count: 0,
            bytes_served: 0,
            profile_id: profile_id.to_string(),
            slot_held: false,
            created_at: now,
            last_activity: now,
        }
    }

    /// Flatten into hash fields. Optional fields serialize as empty strings
    /// so a full HSET always writes the same field set.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("session_id".into(), self.session_id.clone()),
            ("upstream_url".into(), self.upstream_url.clone()),
            (
                "final_url".into(),
                self.final_url.clone().unwrap_or_default(),
            ),
            (
                "request_headers".into(),
                serde_json::to_string(&self.request_headers).unwrap_or_else(|_| "{}".into()),
            ),
            (
                "content_length".into(),
                self.content_length.map(|l| l.to_string()).unwrap_or_default(),
            ),
            (
                "content_type".into(),
                self.content_type.clone().unwrap_or_default(),
            ),
            (
                "active_stream_count".into(),
                self.active_stream_count.to_string(),
            ),
            ("request_count".into(), self.request_count.to_string()),
            ("bytes_served".into(), self.bytes_served.to_string()),
            ("profile_id".into(), self.profile_id.clone()),
            (
                "slot_held".into(),
                if self.slot_held { "1" } else { "0" }.into(),
            ),
            ("created_at".into(), self.created_at.to_string()),
            ("last_activity".into(), self.last_activity.to_string()),
        ]
    }

    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Self> {
        let required = |name: &str| -> StoreResult<String> {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::corrupt(key, format!("missing field '{name}'")))
        };
        let optional = |name: &str| -> Option<String> {
            fields.get(name).filter(|v| !v.is_empty()).cloned()
        };
        let numeric = |name: &str, value: &str| -> StoreResult<u64> {
            value
                .parse()
                .map_err(|_| StoreError::corrupt(key, format!("bad numeric field '{name}'")))
        };

        let request_headers = match optional("request_headers") {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::corrupt(key, format!("bad request_headers: {e}")))?,
            None => HashMap::new(),
        };

        let content_length = match optional("content_length") {
            Some(v) => Some(numeric("content_length", &v)?),
            None => None,
        };

        Ok(Self {
            session_id: required("session_id")?,
            upstream_url: required("upstream_url")?,
            final_url: optional("final_url"),
            request_headers,
            content_length,
            content_type: optional("content_type"),
            active_stream_count: numeric("active_stream_count", &required("active_stream_count")?)?,
            request_count: numeric("request_count", &required("request_count")?)?,
            bytes_served: numeric("bytes_served", &required("bytes_served")?)?,
            profile_id: required("profile_id")?,
            slot_held: required("slot_held")? == "1",
            created_at: required("created_at")?
                .parse()
                .map_err(|_| StoreError::corrupt(key, "bad created_at"))?,
            last_activity: required("last_activity")?
                .parse()
                .map_err(|_| StoreError::corrupt(key, "bad last_activity"))?,
        })
    }

    pub fn idle_seconds(&self, now: i64) -> i64 {
        now - self.last_activity
    }
}

/// Denormalized session metadata for the sweeper and the sessions API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub content_kind: ContentKind,
    pub content_id: String,
    pub content_name: String,
    pub profile_id: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timeshift: TimeshiftParams,
    pub created_at: i64,
    pub last_activity: i64,
}

impl SessionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: &str,
        content: &ContentDescriptor,
        profile_id: &str,
        client_ip: Option<String>,
        user_agent: Option<String>,
        timeshift: TimeshiftParams,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            session_id: session_id.to_string(),
            content_kind: content.kind,
            content_id: content.id.clone(),
            content_name: content.name.clone(),
            profile_id: profile_id.to_string(),
            client_ip,
            user_agent,
            timeshift,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("session_id".into(), self.session_id.clone()),
            ("content_kind".into(), self.content_kind.to_string()),
            ("content_id".into(), self.content_id.clone()),
            ("content_name".into(), self.content_name.clone()),
            ("profile_id".into(), self.profile_id.clone()),
            ("client_ip".into(), self.client_ip.clone().unwrap_or_default()),
            (
                "user_agent".into(),
                self.user_agent.clone().unwrap_or_default(),
            ),
            (
                "utc_start".into(),
                self.timeshift.utc_start.clone().unwrap_or_default(),
            ),
            (
                "utc_end".into(),
                self.timeshift.utc_end.clone().unwrap_or_default(),
            ),
            (
                "offset".into(),
                self.timeshift.offset.map(|o| o.to_string()).unwrap_or_default(),
            ),
            ("created_at".into(), self.created_at.to_string()),
            ("last_activity".into(), self.last_activity.to_string()),
        ]
    }

    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Self> {
        let required = |name: &str| -> StoreResult<String> {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::corrupt(key, format!("missing field '{name}'")))
        };
        let optional = |name: &str| -> Option<String> {
            fields.get(name).filter(|v| !v.is_empty()).cloned()
        };

        let content_kind = required("content_kind")?
            .parse::<ContentKind>()
            .map_err(|e| StoreError::corrupt(key, e))?;

        let offset = match optional("offset") {
            Some(v) => Some(
                v.parse()
                    .map_err(|_| StoreError::corrupt(key, "bad offset"))?,
            ),
            None => None,
        };

        Ok(Self {
            session_id: required("session_id")?,
            content_kind,
            content_id: required("content_id")?,
            content_name: required("content_name")?,
            profile_id: required("profile_id")?,
            client_ip: optional("client_ip"),
            user_agent: optional("user_agent"),
            timeshift: TimeshiftParams {
                utc_start: optional("utc_start"),
                utc_end: optional("utc_end"),
                offset,
            },
            created_at: required("created_at")?
                .parse()
                .map_err(|_| StoreError::corrupt(key, "bad created_at"))?,
            last_activity: required("last_activity")?
                .parse()
                .map_err(|_| StoreError::corrupt(key, "bad last_activity"))?,
        })
    }
}
