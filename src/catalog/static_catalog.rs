//! Config-backed catalog implementation

use async_trait::async_trait;
use regex::Regex;

use super::{ContentCatalog, ProfileSelector, ResolvedContent};
use crate::config::CatalogConfig;
use crate::errors::{VodError, VodResult};
use crate::models::{ContentDescriptor, ContentKind, Profile};

/// Catalog and profile set loaded once from the `[catalog]` config section.
pub struct StaticCatalog {
    profiles: Vec<Profile>,
    content: Vec<crate::config::ContentEntry>,
}

impl StaticCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        let profiles = config
            .profiles
            .iter()
            .map(|entry| Profile {
                id: entry.id.clone(),
                name: entry.name.clone(),
                max_streams: entry.max_streams,
                search_pattern: entry.search_pattern.clone(),
                replace_pattern: entry.replace_pattern.clone(),
                user_agent_pattern: entry.user_agent_pattern.clone(),
                is_default: entry.is_default,
            })
            .collect();

        Self {
            profiles,
            content: config.content.clone(),
        }
    }

    fn entry(&self, kind: ContentKind, content_id: &str) -> Option<&crate::config::ContentEntry> {
        self.content
            .iter()
            .find(|e| e.id == content_id && e.kind.parse() == Ok(kind))
    }
}

#[async_trait]
impl ContentCatalog for StaticCatalog {
    async fn resolve(&self, kind: ContentKind, content_id: &str) -> VodResult<ResolvedContent> {
        let entry = self
            .entry(kind, content_id)
            .ok_or_else(|| VodError::content_not_found(kind.to_string(), content_id))?;

        if kind == ContentKind::Series {
            let first_episode_id = entry.episodes.first().ok_or_else(|| {
                VodError::content_not_found(ContentKind::Series.to_string(), content_id)
            })?;
            let episode = self
                .entry(ContentKind::Episode, first_episode_id)
                .ok_or_else(|| {
                    VodError::content_not_found(
                        ContentKind::Episode.to_string(),
                        first_episode_id.as_str(),
                    )
                })?;
            let raw_url = episode.url.clone().ok_or_else(|| {
                VodError::content_not_found(ContentKind::Episode.to_string(), episode.id.as_str())
            })?;
            return Ok(ResolvedContent {
                descriptor: ContentDescriptor {
                    id: episode.id.clone(),
                    name: episode.name.clone(),
                    kind: ContentKind::Episode,
                },
                raw_url,
            });
        }

        let raw_url = entry
            .url
            .clone()
            .ok_or_else(|| VodError::content_not_found(kind.to_string(), content_id))?;

        Ok(ResolvedContent {
            descriptor: ContentDescriptor {
                id: entry.id.clone(),
                name: entry.name.clone(),
                kind,
            },
            raw_url,
        })
    }
}

#[async_trait]
impl ProfileSelector for StaticCatalog {
    async fn select(
        &self,
        requested_profile_id: Option<&str>,
        user_agent: Option<&str>,
    ) -> VodResult<Profile> {
        if let Some(id) = requested_profile_id {
            return self
                .profiles
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or(VodError::NoProfileAvailable);
        }

        if let Some(ua) = user_agent {
            for profile in &self.profiles {
                if let Some(pattern) = &profile.user_agent_pattern {
                    if let Ok(re) = Regex::new(pattern) {
                        if re.is_match(ua) {
                            return Ok(profile.clone());
                        }
                    }
                }
            }
        }

        self.profiles
            .iter()
            .find(|p| p.is_default)
            .cloned()
            .ok_or(VodError::NoProfileAvailable)
    }
}
