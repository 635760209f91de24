//! Content-length discovery probe
//!
//! Some upstreams omit `Content-Length` on full responses but still honor
//! ranges. A 1 KiB ranged request recovers the total from the
//! `Content-Range` header so seeking works on the very first play. The
//! probe is best-effort: when it fails the session simply streams without
//! a known length.

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::utils::url::obfuscate_credentials;

const PROBE_RANGE: &str = "bytes=0-1024";

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// URL after any redirects the probe followed.
    pub final_url: String,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// Total-length component of a `Content-Range` header, when present.
///
/// Accepts `bytes 0-1024/4096` and `bytes */4096`; a `*` total yields
/// `None`.
pub fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Issue the ranged probe and collect what the upstream revealed.
pub async fn discover(client: &Client, url: &str, forwarded: &HeaderMap) -> Option<ProbeOutcome> {
    let mut headers = forwarded.clone();
    headers.insert(header::RANGE, HeaderValue::from_static(PROBE_RANGE));

    let response = match client.get(url).headers(headers).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                url = %obfuscate_credentials(url),
                error = %e,
                "Length probe failed, continuing without content length"
            );
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(
            url = %obfuscate_credentials(url),
            %status,
            "Length probe rejected, continuing without content length"
        );
        return None;
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = if status == StatusCode::PARTIAL_CONTENT {
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
    } else {
        // upstream ignored the range; its Content-Length is already the total
        response.content_length()
    };

    debug!(
        url = %obfuscate_credentials(&final_url),
        ?content_length,
        "Length probe completed"
    );
    Some(ProbeOutcome {
        final_url,
        content_length,
        content_type,
    })
}
