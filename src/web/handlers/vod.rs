//! VOD streaming handlers
//!
//! A request without a `session_id` is redirected back to itself with a
//! freshly minted one, so every player lands on a stable session URL and
//! all of its seeks share one upstream connection. Requests carrying a
//! `session_id` resolve content and profile, open or adopt the session,
//! and hand off to the stream engine.

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{build_stream_url, parse_content_kind};
use crate::errors::VodResult;
use crate::models::{SessionRecord, TimeshiftParams};
use crate::proxy::{engine, timeshift};
use crate::web::AppState;
use crate::web::extractors::{RequestContext, VodQuery};

pub async fn serve_vod(
    State(state): State<AppState>,
    Path((content_type, content_id)): Path<(String, String)>,
    Query(query): Query<VodQuery>,
    RawQuery(raw_query): RawQuery,
    context: RequestContext,
    headers: HeaderMap,
) -> VodResult<Response> {
    stream(
        state,
        &content_type,
        &content_id,
        None,
        query,
        raw_query,
        context,
        headers,
    )
    .await
}

pub async fn serve_vod_with_profile(
    State(state): State<AppState>,
    Path((content_type, content_id, profile_id)): Path<(String, String, String)>,
    Query(query): Query<VodQuery>,
    RawQuery(raw_query): RawQuery,
    context: RequestContext,
    headers: HeaderMap,
) -> VodResult<Response> {
    stream(
        state,
        &content_type,
        &content_id,
        Some(profile_id),
        query,
        raw_query,
        context,
        headers,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn stream(
    state: AppState,
    content_type: &str,
    content_id: &str,
    path_profile_id: Option<String>,
    query: VodQuery,
    raw_query: Option<String>,
    context: RequestContext,
    headers: HeaderMap,
) -> VodResult<Response> {
    let Some(session_id) = query.session_id.clone() else {
        let location = redirect_location(
            content_type,
            content_id,
            path_profile_id.as_deref(),
            raw_query.as_deref(),
        );
        debug!(
            request_id = %context.request_id,
            %location,
            "No session id, redirecting to minted session"
        );
        return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
    };

    let kind = parse_content_kind(content_type)?;
    let resolved = state.catalog.resolve(kind, content_id).await?;

    let requested_profile = path_profile_id.as_deref().or(query.profile_id.as_deref());
    let profile = state
        .profiles
        .select(requested_profile, context.user_agent.as_deref())
        .await?;

    let timeshift_params = TimeshiftParams {
        utc_start: query.utc_start.clone(),
        utc_end: query.utc_end.clone(),
        offset: query.offset,
    };
    let upstream_url = timeshift::apply(
        &build_stream_url(&resolved.raw_url, &profile),
        &timeshift_params,
    );

    let record = SessionRecord::new(
        &session_id,
        &resolved.descriptor,
        &profile.id,
        context.client_ip.clone(),
        context.user_agent.clone(),
        timeshift_params,
    );

    let stored_headers = engine::forward_headers(&headers, context.client_ip.as_deref())
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let connection = state
        .engine
        .registry()
        .open_session(&record, &upstream_url, &profile, stored_headers)
        .await?;

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    state
        .engine
        .serve(connection, range_header, &headers, context.client_ip.as_deref())
        .await
}

/// Same URL plus a minted `session_id`, preserving the original query.
/// Path parameters arrive percent-decoded, so segments are re-encoded.
fn redirect_location(
    content_type: &str,
    content_id: &str,
    profile_id: Option<&str>,
    raw_query: Option<&str>,
) -> String {
    let mut location = format!(
        "/proxy/vod/{}/{}",
        urlencoding::encode(content_type),
        urlencoding::encode(content_id)
    );
    if let Some(profile_id) = profile_id {
        location.push('/');
        location.push_str(&urlencoding::encode(profile_id));
    }
    match raw_query {
        Some(existing) if !existing.is_empty() => {
            location.push('?');
            location.push_str(existing);
            location.push('&');
        }
        _ => location.push('?'),
    }
    location.push_str("session_id=");
    location.push_str(&Uuid::new_v4().to_string());
    location
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_preserves_existing_query() {
        let location = redirect_location("movie", "m-1", None, Some("utc_start=x&offset=5"));
        assert!(location.starts_with("/proxy/vod/movie/m-1?utc_start=x&offset=5&session_id="));
    }

    #[test]
    fn redirect_without_query_appends_session_id_only() {
        let location = redirect_location("episode", "e-9", Some("main"), None);
        assert!(location.starts_with("/proxy/vod/episode/e-9/main?session_id="));
        let minted = location.rsplit_once('=').unwrap().1;
        assert!(Uuid::parse_str(minted).is_ok());
    }

    #[test]
    fn redirect_re_encodes_decoded_path_segments() {
        let location = redirect_location("movie", "a b/c", None, None);
        assert!(location.starts_with("/proxy/vod/movie/a%20b%2Fc?session_id="));
    }
}
