//! Session API and profile limit integration tests
//!
//! Exercises the management surface: per-profile caps across distinct
//! sessions, the sessions listing, forced termination, and the health
//! probes.

mod support;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;

use support::{TestUpstream, test_server};

async fn stream_once(server: &TestServer, session_id: &str) -> StatusCode {
    server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", session_id)
        .add_header("range", "bytes=0-127")
        .await
        .status_code()
}

#[tokio::test]
async fn profile_cap_holds_across_sessions_but_not_within_one() {
    let upstream = TestUpstream::spawn(vec![7u8; 2048]).await;
    let server = test_server(&upstream.url, 1);

    assert_eq!(stream_once(&server, "sess-a").await, StatusCode::PARTIAL_CONTENT);

    // a second session wants a second upstream slot and the cap is 1
    let refused = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-b")
        .add_header("range", "bytes=0-127")
        .await;
    assert_eq!(refused.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let envelope: Value = refused.json();
    assert_eq!(envelope["success"], false);

    // seeks inside the existing session reuse its slot
    assert_eq!(stream_once(&server, "sess-a").await, StatusCode::PARTIAL_CONTENT);
}

#[tokio::test]
async fn sessions_listing_reports_reuse_and_slot_usage() {
    let upstream = TestUpstream::spawn(vec![7u8; 2048]).await;
    let server = test_server(&upstream.url, 2);

    stream_once(&server, "sess-list").await;
    stream_once(&server, "sess-list").await;

    // byte counters flush from a spawned task when the relay ends
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = server.get("/api/v1/sessions").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let envelope: Value = response.json();
    assert_eq!(envelope["success"], true);

    let sessions = envelope["data"]["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], "sess-list");
    assert_eq!(sessions[0]["content_id"], "m-1");
    assert_eq!(sessions[0]["profile_id"], "main");
    assert_eq!(sessions[0]["request_count"], 2);
    assert_eq!(sessions[0]["bytes_served"], 256);
    assert_eq!(sessions[0]["content_length"], 2048);
    assert_eq!(sessions[0]["resolved"], true);

    let profiles = envelope["data"]["profiles"].as_array().unwrap();
    let main = profiles.iter().find(|p| p["profile_id"] == "main").unwrap();
    assert_eq!(main["active_streams"], 1);
    assert_eq!(main["max_streams"], 2);
}

#[tokio::test]
async fn deleting_a_session_frees_its_slot() {
    let upstream = TestUpstream::spawn(vec![7u8; 2048]).await;
    let server = test_server(&upstream.url, 1);

    assert_eq!(stream_once(&server, "sess-a").await, StatusCode::PARTIAL_CONTENT);
    assert_eq!(stream_once(&server, "sess-b").await, StatusCode::TOO_MANY_REQUESTS);

    let deleted = server.delete("/api/v1/sessions/sess-a").await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    let envelope: Value = deleted.json();
    assert_eq!(envelope["data"]["terminated"], true);

    // the freed slot is available to the waiting session
    assert_eq!(stream_once(&server, "sess-b").await, StatusCode::PARTIAL_CONTENT);

    let missing = server.delete("/api/v1/sessions/sess-a").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_agent_pattern_selects_the_matching_profile() {
    let upstream = TestUpstream::spawn(vec![7u8; 2048]).await;
    let server = test_server(&upstream.url, 2);

    let response = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-ua")
        .add_header("user-agent", "VLC/3.0.20 LibVLC/3.0.20")
        .add_header("range", "bytes=0-127")
        .await;
    assert_eq!(response.status_code(), StatusCode::PARTIAL_CONTENT);

    let envelope: Value = server.get("/api/v1/sessions").await.json();
    assert_eq!(envelope["data"]["sessions"][0]["profile_id"], "vlc");
    assert_eq!(
        envelope["data"]["sessions"][0]["user_agent"],
        "VLC/3.0.20 LibVLC/3.0.20"
    );
}

#[tokio::test]
async fn path_profile_overrides_user_agent_match() {
    let upstream = TestUpstream::spawn(vec![7u8; 2048]).await;
    let server = test_server(&upstream.url, 2);

    let response = server
        .get("/proxy/vod/movie/m-1/main")
        .add_query_param("session_id", "sess-explicit")
        .add_header("user-agent", "VLC/3.0.20")
        .add_header("range", "bytes=0-127")
        .await;
    assert_eq!(response.status_code(), StatusCode::PARTIAL_CONTENT);

    let envelope: Value = server.get("/api/v1/sessions").await.json();
    assert_eq!(envelope["data"]["sessions"][0]["profile_id"], "main");
}

#[tokio::test]
async fn health_probes_respond() {
    let upstream = TestUpstream::spawn(vec![7u8; 128]).await;
    let server = test_server(&upstream.url, 2);

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    let body: Value = health.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");

    assert_eq!(server.get("/live").await.status_code(), StatusCode::OK);
    assert_eq!(server.get("/ready").await.status_code(), StatusCode::OK);
}
