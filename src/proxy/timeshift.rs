//! Timeshift/catchup URL rewriting
//!
//! Providers disagree on parameter names for catchup windows, so every
//! supplied value is mirrored into all known aliases: `utc_start`/`start`,
//! `utc_end`/`end`, `offset`/`seek`/`t`. URLs whose path already carries a
//! `/YYYY-MM-DD/HH-MM-SS/` catchup segment get that segment rewritten to
//! the requested window start.
//!
//! Rewriting never fails a request. Any error falls back to the unmodified
//! URL with a warning.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;
use url::Url;

use crate::models::TimeshiftParams;

fn catchup_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/\d{4}-\d{2}-\d{2}/\d{2}-\d{2}-\d{2}/")
            .unwrap_or_else(|e| panic!("catchup path regex: {e}"))
    })
}

/// Apply timeshift parameters to an upstream URL.
pub fn apply(upstream_url: &str, params: &TimeshiftParams) -> String {
    if params.is_empty() {
        return upstream_url.to_string();
    }

    match try_apply(upstream_url, params) {
        Ok(rewritten) => rewritten,
        Err(message) => {
            warn!(
                url = %upstream_url,
                "Timeshift rewrite failed, using URL unmodified: {}",
                message
            );
            upstream_url.to_string()
        }
    }
}

fn try_apply(upstream_url: &str, params: &TimeshiftParams) -> Result<String, String> {
    let mut url = Url::parse(upstream_url).map_err(|e| e.to_string())?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(utc_start) = &params.utc_start {
        set_aliases(&mut pairs, &["utc_start", "start"], utc_start);
    }
    if let Some(utc_end) = &params.utc_end {
        set_aliases(&mut pairs, &["utc_end", "end"], utc_end);
    }
    if let Some(offset) = params.offset {
        set_aliases(&mut pairs, &["offset", "seek", "t"], &offset.to_string());
    }

    url.set_query(None);
    if !pairs.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
    }

    if let Some(utc_start) = &params.utc_start {
        rewrite_catchup_path(&mut url, utc_start)?;
    }

    Ok(url.to_string())
}

fn set_aliases(pairs: &mut Vec<(String, String)>, aliases: &[&str], value: &str) {
    pairs.retain(|(k, _)| !aliases.contains(&k.as_str()));
    for alias in aliases {
        pairs.push((alias.to_string(), value.to_string()));
    }
}

fn rewrite_catchup_path(url: &mut Url, utc_start: &str) -> Result<(), String> {
    let path = url.path().to_string();
    if !catchup_path_regex().is_match(&path) {
        return Ok(());
    }

    let start: DateTime<Utc> = utc_start
        .parse()
        .map_err(|e| format!("bad utc_start '{utc_start}': {e}"))?;
    let segment = start.format("/%Y-%m-%d/%H-%M-%S/").to_string();
    let rewritten = catchup_path_regex().replace(&path, segment.as_str());
    url.set_path(&rewritten);
    Ok(())
}
