//! Error type definitions for the VOD proxy
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur while serving a
/// VOD request. It uses `thiserror` to provide automatic error trait
/// implementations and proper error chaining.
#[derive(Error, Debug)]
pub enum VodError {
    /// Shared-store errors (redis connectivity, hash round-trips)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Profile concurrency cap reached
    #[error("Profile limit exceeded: {profile_name} at {current}/{max} streams")]
    ProfileLimitExceeded {
        profile_name: String,
        current: u64,
        max: u64,
    },

    /// No profile matched the request and no default is configured
    #[error("No profile available for this request")]
    NoProfileAvailable,

    /// Upstream could not be reached at all
    #[error("Upstream unreachable: {url} - {message}")]
    UpstreamUnreachable { url: String, message: String },

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    /// Requested byte range lies outside the content
    #[error("Range not satisfiable (length {length})")]
    RangeNotSatisfiable { length: u64 },

    /// Session-creation lock still held after bounded retries
    #[error("Session {session_id} is being created by another worker")]
    LockContended { session_id: String },

    /// Requested content does not exist in the catalog
    #[error("Content not found: {kind} {id}")]
    ContentNotFound { kind: String, id: String },

    /// Malformed request input
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Shared-store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis command or connection failures
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored hash is missing a required field or holds an unparsable value
    #[error("Corrupt record at {key}: {message}")]
    CorruptRecord { key: String, message: String },

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Convenience methods for creating common error types
impl VodError {
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn content_not_found<K: Into<String>, I: Into<String>>(kind: K, id: I) -> Self {
        Self::ContentNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn upstream_unreachable<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::UpstreamUnreachable {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl StoreError {
    pub fn corrupt<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            message: message.into(),
        }
    }
}
