//! Request extractors
//!
//! `RequestContext` gathers the per-request facts the handlers care about
//! (client IP, user agent) without each handler picking through headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Context extracted from every incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        // behind a reverse proxy the first x-forwarded-for entry is the client
        let client_ip = headers
            .get("x-real-ip")
            .or_else(|| headers.get("x-forwarded-for"))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(RequestContext {
            request_id: Uuid::new_v4().to_string(),
            client_ip,
            user_agent,
            received_at: Utc::now(),
        })
    }
}

/// Query parameters accepted by the VOD endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VodQuery {
    pub session_id: Option<String>,
    pub profile_id: Option<String>,
    pub utc_start: Option<String>,
    pub utc_end: Option<String>,
    pub offset: Option<u64>,
}
