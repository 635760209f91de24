//! Content catalog and profile selection seams
//!
//! The proxy core treats catalog storage and account management as external
//! collaborators. These traits are the contract; the bundled
//! [`StaticCatalog`] feeds them from the config file so the binary runs
//! standalone, and real deployments plug their own implementations in
//! behind the same traits.

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::errors::{VodError, VodResult};
use crate::models::{ContentDescriptor, ContentKind, Profile};

pub mod static_catalog;

pub use static_catalog::StaticCatalog;

/// Resolved content: descriptor plus the raw upstream URL before any
/// profile rewrite.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub descriptor: ContentDescriptor,
    pub raw_url: String,
}

#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Look up content by kind and id. A `series` id resolves to its first
    /// episode, which is what players expect when handed a series URL.
    async fn resolve(&self, kind: ContentKind, content_id: &str) -> VodResult<ResolvedContent>;
}

#[async_trait]
pub trait ProfileSelector: Send + Sync {
    /// Pick the profile for a request: an explicitly requested profile id
    /// wins, then the first profile whose user-agent pattern matches, then
    /// the default profile.
    async fn select(
        &self,
        requested_profile_id: Option<&str>,
        user_agent: Option<&str>,
    ) -> VodResult<Profile>;
}

/// Apply a profile's search/replace rewrite to an upstream URL.
///
/// The replace pattern uses `$1`-style capture references. A pattern that
/// fails to compile leaves the URL unmodified rather than failing the
/// request.
pub fn build_stream_url(raw_url: &str, profile: &Profile) -> String {
    let (Some(search), Some(replace)) = (&profile.search_pattern, &profile.replace_pattern) else {
        return raw_url.to_string();
    };

    match Regex::new(search) {
        Ok(re) => re.replace_all(raw_url, replace.as_str()).into_owned(),
        Err(e) => {
            warn!(
                profile_id = %profile.id,
                pattern = %search,
                "Invalid profile search pattern, using URL unmodified: {}",
                e
            );
            raw_url.to_string()
        }
    }
}

/// Shorthand used by handlers when the requested kind string is unknown.
pub fn parse_content_kind(kind: &str) -> VodResult<ContentKind> {
    kind.parse()
        .map_err(|_| VodError::invalid_request(format!("unknown content type '{kind}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(search: Option<&str>, replace: Option<&str>) -> Profile {
        Profile {
            id: "p1".to_string(),
            name: "test".to_string(),
            max_streams: 2,
            search_pattern: search.map(str::to_string),
            replace_pattern: replace.map(str::to_string),
            user_agent_pattern: None,
            is_default: true,
        }
    }

    #[test]
    fn rewrites_url_with_capture_groups() {
        let p = profile(
            Some(r"^http://provider\.example/(\w+)/(.*)$"),
            Some("http://mirror.example/$1/vod/$2"),
        );
        assert_eq!(
            build_stream_url("http://provider.example/movie/42.mkv", &p),
            "http://mirror.example/movie/vod/42.mkv"
        );
    }

    #[test]
    fn passes_url_through_without_patterns() {
        let p = profile(None, None);
        assert_eq!(
            build_stream_url("http://provider.example/movie/42.mkv", &p),
            "http://provider.example/movie/42.mkv"
        );
    }

    #[test]
    fn invalid_pattern_falls_back_to_original() {
        let p = profile(Some("("), Some("x"));
        assert_eq!(
            build_stream_url("http://provider.example/movie/42.mkv", &p),
            "http://provider.example/movie/42.mkv"
        );
    }
}
