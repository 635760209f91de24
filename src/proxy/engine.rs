//! Stream proxy engine
//!
//! Performs the upstream fetch for a session and relays the body to the
//! client. The first request follows redirects and records the resolved
//! media URL; later requests for the same session go straight to that URL
//! with redirects disabled, so a redirect there is treated as a stale
//! resolution and the session is torn down rather than chased.
//!
//! Relay bookkeeping is sampled: `last_activity` and the byte counter are
//! flushed every N chunks instead of per chunk, matching the store write
//! rate to the chunk rate a seeking video player actually produces.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::{VodError, VodResult};
use crate::models::ConnectionState;
use crate::proxy::probe;
use crate::proxy::range;
use crate::proxy::registry::SessionRegistry;
use crate::utils::http_client::UpstreamClients;
use crate::utils::url::obfuscate_credentials;

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Client request headers replayed to the upstream server.
const FORWARDED_HEADERS: [header::HeaderName; 5] = [
    header::USER_AGENT,
    header::AUTHORIZATION,
    header::REFERER,
    header::ORIGIN,
    header::ACCEPT,
];

pub struct StreamEngine {
    registry: SessionRegistry,
    clients: UpstreamClients,
    chunk_size: usize,
    activity_sample_chunks: u64,
}

impl StreamEngine {
    pub fn new(
        registry: SessionRegistry,
        clients: UpstreamClients,
        session_config: &SessionConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            chunk_size: session_config.chunk_size.max(1),
            activity_sample_chunks: session_config.activity_sample_chunks.max(1),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Fetch the session's upstream content and build the streaming
    /// response.
    ///
    /// Unrecoverable upstream failures (connect errors, error statuses,
    /// mid-relay stream errors) tear the session down before the error is
    /// reported, so a dead `final_url` never survives as an idle session.
    pub async fn serve(
        &self,
        mut state: ConnectionState,
        range_header: Option<&str>,
        request_headers: &HeaderMap,
        client_ip: Option<&str>,
    ) -> VodResult<Response<Body>> {
        let session_id = state.session_id.clone();
        let forwarded = forward_headers(request_headers, client_ip);

        // full-body request with no known length: one bounded probe makes
        // seeking work from the first play
        if state.content_length.is_none() && range_header.is_none() {
            let (client, target) = self.pick_route(&state);
            if let Some(outcome) = probe::discover(client, &target, &forwarded).await {
                state = self
                    .registry
                    .record_resolution(
                        &session_id,
                        Some(&outcome.final_url),
                        outcome.content_length,
                        outcome.content_type.as_deref(),
                    )
                    .await?;
            }
        }

        let plan = range::negotiate(range_header, state.content_length)?;

        let (client, target) = self.pick_route(&state);
        let safe_url = obfuscate_credentials(&target);

        let mut request = client.get(&target).headers(forwarded);
        if let Some(range_value) = &plan.upstream_header {
            request = request.header(header::RANGE, range_value.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    url = %safe_url,
                    error = %e,
                    "Upstream connect failed, tearing session down"
                );
                self.teardown_quietly(&session_id).await;
                return Err(VodError::upstream_unreachable(safe_url, e.to_string()));
            }
        };

        let upstream_status = response.status();
        if !upstream_status.is_success() {
            warn!(
                session_id = %session_id,
                url = %safe_url,
                status = %upstream_status,
                "Upstream refused the request, tearing session down"
            );
            self.teardown_quietly(&session_id).await;
            return Err(VodError::UpstreamStatus {
                status: upstream_status.as_u16(),
                url: safe_url,
            });
        }

        let header_content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let upstream_content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let upstream_content_length = response.content_length();
        let total_length = if upstream_status == StatusCode::PARTIAL_CONTENT {
            upstream_content_range
                .as_deref()
                .and_then(probe::content_range_total)
        } else {
            upstream_content_length
        };

        if state.final_url.is_none()
            || state.content_length.is_none()
            || state.content_type.is_none()
        {
            state = self
                .registry
                .record_resolution(
                    &session_id,
                    Some(response.url().as_str()),
                    total_length,
                    header_content_type.as_deref(),
                )
                .await?;
        }

        self.registry.stream_started(&session_id).await?;

        let mut guard = RelayGuard {
            registry: self.registry.clone(),
            session_id: session_id.clone(),
            sample_every: self.activity_sample_chunks,
            chunks: 0,
            pending_bytes: 0,
            finished: false,
        };
        let chunk_size = self.chunk_size;
        let relay_url = safe_url.clone();
        let byte_stream = response
            .bytes_stream()
            .flat_map(move |result| futures::stream::iter(split_into_chunks(result, chunk_size)))
            .map(move |result| match result {
                Ok(chunk) => {
                    guard.on_chunk(chunk.len());
                    Ok(chunk)
                }
                Err(e) => {
                    warn!(
                        session_id = %guard.session_id,
                        url = %relay_url,
                        error = %e,
                        "Upstream stream failed mid-relay, tearing session down"
                    );
                    guard.abort();
                    Err(e)
                }
            });

        let content_type = state
            .content_type
            .clone()
            .or(header_content_type)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let status = if plan.resolved.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else if plan.upstream_header.is_some() {
            // pass-through range: the upstream's verdict is relayed as-is
            upstream_status
        } else {
            StatusCode::OK
        };

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");

        if state.content_length.is_some() {
            builder = builder.header(header::ACCEPT_RANGES, "bytes");
        }

        if let Some(resolved) = plan.resolved {
            if let Some(total) = state.content_length {
                builder = builder.header(header::CONTENT_RANGE, resolved.content_range(total));
            }
            builder = builder.header(header::CONTENT_LENGTH, resolved.byte_count());
        } else if plan.upstream_header.is_some() {
            if let Some(value) = upstream_content_range {
                builder = builder.header(header::CONTENT_RANGE, value);
            }
            if let Some(length) = upstream_content_length {
                builder = builder.header(header::CONTENT_LENGTH, length);
            }
        } else if let Some(total) = state.content_length {
            builder = builder.header(header::CONTENT_LENGTH, total);
        }

        info!(
            session_id = %session_id,
            %status,
            range = plan.upstream_header.as_deref().unwrap_or("-"),
            url = %safe_url,
            "Streaming relay established"
        );

        builder
            .body(Body::from_stream(byte_stream))
            .map_err(|e| VodError::configuration(format!("failed to assemble relay response: {e}")))
    }

    /// Final URL with redirects disabled when known, otherwise the original
    /// upstream URL with redirects followed.
    fn pick_route(&self, state: &ConnectionState) -> (&Client, String) {
        match &state.final_url {
            Some(final_url) => (self.clients.direct(), final_url.clone()),
            None => (self.clients.following(), state.upstream_url.clone()),
        }
    }

    async fn teardown_quietly(&self, session_id: &str) {
        if let Err(e) = self.registry.teardown(session_id).await {
            warn!(
                session_id = %session_id,
                error = %e,
                "Teardown after upstream failure also failed"
            );
        }
    }
}

pub(crate) fn forward_headers(request_headers: &HeaderMap, client_ip: Option<&str>) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = request_headers.get(&name) {
            forwarded.insert(name, value.clone());
        }
    }
    if let Some(ip) = client_ip {
        if let Ok(value) = HeaderValue::from_str(ip) {
            forwarded.insert(header::HeaderName::from_static("x-forwarded-for"), value.clone());
            forwarded.insert(header::HeaderName::from_static("x-real-ip"), value);
        }
    }
    forwarded
}

/// Re-chunk an upstream read into fixed-size relay chunks.
fn split_into_chunks(
    result: reqwest::Result<Bytes>,
    chunk_size: usize,
) -> Vec<reqwest::Result<Bytes>> {
    match result {
        Ok(mut bytes) => {
            let mut parts = Vec::with_capacity(bytes.len() / chunk_size + 1);
            while bytes.len() > chunk_size {
                parts.push(Ok(bytes.split_to(chunk_size)));
            }
            if !bytes.is_empty() {
                parts.push(Ok(bytes));
            }
            parts
        }
        Err(e) => vec![Err(e)],
    }
}

/// Owns the relay's session bookkeeping.
///
/// Dropped when the client drains the body or disconnects, which routes the
/// session into the delayed-cleanup path. `abort` switches to immediate
/// teardown for mid-relay upstream failures.
struct RelayGuard {
    registry: SessionRegistry,
    session_id: String,
    sample_every: u64,
    chunks: u64,
    pending_bytes: u64,
    finished: bool,
}

impl RelayGuard {
    fn on_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.pending_bytes += len as u64;
        if self.chunks % self.sample_every == 0 {
            let bytes = std::mem::take(&mut self.pending_bytes);
            let registry = self.registry.clone();
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = registry.record_progress(&session_id, bytes).await {
                    debug!(session_id = %session_id, error = %e, "Activity update failed");
                }
            });
        }
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let registry = self.registry.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.teardown(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Teardown after relay failure failed");
            }
        });
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let registry = self.registry.clone();
        let session_id = self.session_id.clone();
        let bytes = std::mem::take(&mut self.pending_bytes);
        tokio::spawn(async move {
            if bytes > 0 {
                if let Err(e) = registry.record_progress(&session_id, bytes).await {
                    debug!(session_id = %session_id, error = %e, "Final byte count flush failed");
                }
            }
            if let Err(e) = registry.stream_finished(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Stream bookkeeping failed at relay end");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_large_reads_into_fixed_chunks() {
        let parts = split_into_chunks(Ok(Bytes::from(vec![0u8; 20_000])), 8192);
        let sizes: Vec<usize> = parts.iter().map(|p| p.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, vec![8192, 8192, 3616]);
    }

    #[test]
    fn small_reads_pass_through_whole() {
        let parts = split_into_chunks(Ok(Bytes::from_static(b"abc")), 8192);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_ref().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn empty_reads_vanish() {
        assert!(split_into_chunks(Ok(Bytes::new()), 8192).is_empty());
    }

    #[test]
    fn forwards_allowlisted_headers_and_client_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("vlc/3.0.20"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(header::COOKIE, HeaderValue::from_static("secret=1"));

        let forwarded = forward_headers(&headers, Some("203.0.113.9"));
        assert_eq!(forwarded.get(header::USER_AGENT).unwrap(), "vlc/3.0.20");
        assert_eq!(forwarded.get(header::ACCEPT).unwrap(), "*/*");
        assert_eq!(forwarded.get("x-forwarded-for").unwrap(), "203.0.113.9");
        assert_eq!(forwarded.get("x-real-ip").unwrap(), "203.0.113.9");
        assert!(forwarded.get(header::COOKIE).is_none());
    }

    #[test]
    fn client_ip_is_optional() {
        let forwarded = forward_headers(&HeaderMap::new(), None);
        assert!(forwarded.is_empty());
    }
}
