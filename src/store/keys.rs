//! Deterministic key naming for the shared store
//!
//! Every worker derives the same key for the same entity, which is what
//! makes cross-worker session adoption work.

/// Per-profile connection counter.
pub fn profile_connections(profile_id: &str) -> String {
    format!("profile_connections:{profile_id}")
}

/// Session metadata hash.
pub fn session(session_id: &str) -> String {
    format!("vod_session:{session_id}")
}

/// Persistent upstream connection state hash.
pub fn persistent_connection(session_id: &str) -> String {
    format!("vod_persistent_connection:{session_id}")
}

/// Short-TTL mutex guarding session creation.
pub fn connection_lock(session_id: &str) -> String {
    format!("vod_connection_lock:{session_id}")
}

/// Scan pattern matching every persistent connection key.
pub const PERSISTENT_CONNECTION_PATTERN: &str = "vod_persistent_connection:*";

/// Scan pattern matching every session metadata key.
pub const SESSION_PATTERN: &str = "vod_session:*";

/// Extract the session id from a session metadata key, if it is one.
pub fn session_id_from_session_key(key: &str) -> Option<&str> {
    key.strip_prefix("vod_session:")
}

/// Extract the session id from a persistent connection key, if it is one.
pub fn session_id_from_connection_key(key: &str) -> Option<&str> {
    key.strip_prefix("vod_persistent_connection:")
}
