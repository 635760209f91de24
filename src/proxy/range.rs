//! Byte-range negotiation
//!
//! Only the single-range `bytes=<start>-<end>` form is interpreted. Suffix
//! ranges (`bytes=-500`) and multi-range headers are forwarded to the
//! upstream untouched, which keeps seek handling simple while still letting
//! exotic clients get whatever the provider gives them.

use crate::errors::{VodError, VodResult};

/// Inclusive byte range, normalized against a known content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// `Range` header value for the upstream request.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_content_range(total: u64) -> String {
    format!("bytes */{total}")
}

/// How a client's Range header translates to the upstream request and the
/// client response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    /// Range header to send upstream, if any.
    pub upstream_header: Option<String>,
    /// Range we commit to in the client response (206 + Content-Range).
    /// `None` with an upstream header set means pass-through: the upstream
    /// decides whether the range is honored.
    pub resolved: Option<ByteRange>,
}

impl RangePlan {
    pub fn unranged() -> Self {
        Self {
            upstream_header: None,
            resolved: None,
        }
    }
}

/// Parse `bytes=<start>-<end?>`; anything else yields `None`.
fn parse_single_range(raw: &str) -> Option<(u64, Option<u64>)> {
    let spec = raw.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    if end.is_empty() {
        return Some((start, None));
    }
    Some((start, Some(end.parse().ok()?)))
}

/// Negotiate a client Range header against the (possibly unknown) content
/// length.
///
/// With a known length, out-of-bounds starts fail with
/// [`VodError::RangeNotSatisfiable`] and open or overlong ends clamp to the
/// last byte. With an unknown length the raw header is forwarded and
/// validation happens on a later request once the length is discovered.
pub fn negotiate(raw: Option<&str>, content_length: Option<u64>) -> VodResult<RangePlan> {
    let Some(raw) = raw else {
        return Ok(RangePlan::unranged());
    };

    let Some((start, end)) = parse_single_range(raw) else {
        // suffix or multi-range form: the upstream decides
        return Ok(RangePlan {
            upstream_header: Some(raw.to_string()),
            resolved: None,
        });
    };

    let Some(length) = content_length else {
        return Ok(RangePlan {
            upstream_header: Some(raw.to_string()),
            resolved: None,
        });
    };

    if length == 0 || start >= length {
        return Err(VodError::RangeNotSatisfiable { length });
    }

    let end = end.map_or(length - 1, |e| e.min(length - 1));
    if start > end {
        return Err(VodError::RangeNotSatisfiable { length });
    }

    let range = ByteRange { start, end };
    Ok(RangePlan {
        upstream_header: Some(range.header_value()),
        resolved: Some(range),
    })
}
