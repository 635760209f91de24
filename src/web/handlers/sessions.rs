//! Session management API handlers

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::errors::{VodError, VodResult};
use crate::models::TimeshiftParams;
use crate::utils::url::obfuscate_credentials;
use crate::web::AppState;
use crate::web::responses::ApiResponse;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub content_kind: String,
    pub content_id: String,
    pub content_name: String,
    pub profile_id: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "TimeshiftParams::is_empty")]
    pub timeshift: TimeshiftParams,
    pub created_at: i64,
    pub last_activity: i64,
    pub idle_seconds: i64,
    pub active_streams: u64,
    pub request_count: u64,
    pub bytes_served: u64,
    pub content_length: Option<u64>,
    pub upstream_url: String,
    pub resolved: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileUsage {
    pub profile_id: String,
    pub name: String,
    pub active_streams: i64,
    /// 0 means unlimited.
    pub max_streams: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsReport {
    pub sessions: Vec<SessionSummary>,
    pub profiles: Vec<ProfileUsage>,
}

/// List every live session with its connection state plus per-profile
/// slot usage.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> VodResult<ApiResponse<SessionsReport>> {
    let registry = state.engine.registry();
    let now = Utc::now().timestamp();

    let mut sessions = Vec::new();
    for (record, connection) in registry.list_sessions().await? {
        let (active_streams, request_count, bytes_served, content_length, upstream_url, resolved) =
            match &connection {
                Some(c) => (
                    c.active_stream_count,
                    c.request_count,
                    c.bytes_served,
                    c.content_length,
                    obfuscate_credentials(&c.upstream_url),
                    c.final_url.is_some(),
                ),
                None => (0, 0, 0, None, String::new(), false),
            };
        sessions.push(SessionSummary {
            session_id: record.session_id.clone(),
            content_kind: record.content_kind.to_string(),
            content_id: record.content_id,
            content_name: record.content_name,
            profile_id: record.profile_id,
            client_ip: record.client_ip,
            user_agent: record.user_agent,
            timeshift: record.timeshift,
            created_at: record.created_at,
            last_activity: record.last_activity,
            idle_seconds: now - record.last_activity,
            active_streams,
            request_count,
            bytes_served,
            content_length,
            upstream_url,
            resolved,
        });
    }

    let mut profiles = Vec::new();
    for entry in &state.config.catalog.profiles {
        profiles.push(ProfileUsage {
            profile_id: entry.id.clone(),
            name: entry.name.clone(),
            active_streams: registry.limiter().current(&entry.id).await?,
            max_streams: entry.max_streams,
        });
    }

    Ok(ApiResponse::success(SessionsReport { sessions, profiles }))
}

/// Force-terminate a session, releasing its profile slot.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> VodResult<ApiResponse<Value>> {
    if !state.engine.registry().teardown(&session_id).await? {
        return Err(VodError::content_not_found("session", session_id));
    }
    info!(session_id = %session_id, "Session terminated via API");
    Ok(ApiResponse::success(
        json!({ "session_id": session_id, "terminated": true }),
    ))
}
