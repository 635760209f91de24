//! VOD streaming endpoint integration tests
//!
//! Drives the full router against an in-process upstream that honors byte
//! ranges: session minting redirects, first-play length discovery, seek
//! requests against the recorded length, and unsatisfiable ranges.

mod support;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use uuid::Uuid;

use support::{TestUpstream, test_server};

fn media_body() -> Vec<u8> {
    (0..4096u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn request_without_session_id_redirects_to_minted_session() {
    let upstream = TestUpstream::spawn(media_body()).await;
    let server = test_server(&upstream.url, 3);

    let response = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("utc_start", "2023-01-01T12:00:00Z")
        .await;

    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.header("location");
    let location = location.to_str().unwrap();
    assert!(location.starts_with("/proxy/vod/movie/m-1?utc_start="));

    let session_id = location.rsplit_once("session_id=").unwrap().1;
    assert!(Uuid::parse_str(session_id).is_ok(), "minted id: {session_id}");
    // no upstream traffic for a redirect
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn unranged_first_play_probes_length_and_streams_fully() {
    let body = media_body();
    let upstream = TestUpstream::spawn(body.clone()).await;
    let server = test_server(&upstream.url, 3);

    let response = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-full")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("accept-ranges"), "bytes");
    assert_eq!(response.header("content-length"), "4096");
    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert_eq!(&response.as_bytes()[..], &body[..]);
    // one probe plus the relay fetch
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn ranged_requests_seek_within_one_session() {
    let body = media_body();
    let upstream = TestUpstream::spawn(body.clone()).await;
    let server = test_server(&upstream.url, 3);

    // first request: length unknown, the range passes through and the
    // upstream's verdict is relayed
    let first = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-seek")
        .add_header("range", "bytes=0-1023")
        .await;
    assert_eq!(first.status_code(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(first.header("content-range"), "bytes 0-1023/4096");
    assert_eq!(&first.as_bytes()[..], &body[..1024]);

    // the seek validates against the recorded length, no probe needed
    let seek = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-seek")
        .add_header("range", "bytes=1024-2047")
        .await;
    assert_eq!(seek.status_code(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(seek.header("content-range"), "bytes 1024-2047/4096");
    assert_eq!(seek.header("content-length"), "1024");
    assert_eq!(&seek.as_bytes()[..], &body[1024..2048]);

    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn redirect_chain_is_resolved_once_per_session() {
    let body = media_body();
    let upstream = TestUpstream::spawn(body.clone()).await;
    // the catalog points at the provider's redirecting entry point
    let server = test_server(&upstream.redirect_url, 3);

    let first = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-redir")
        .add_header("range", "bytes=0-1023")
        .await;
    assert_eq!(first.status_code(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(&first.as_bytes()[..], &body[..1024]);
    assert_eq!(upstream.redirect_hits(), 1);

    // the seek goes straight to the recorded final URL
    let seek = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-redir")
        .add_header("range", "bytes=1024-2047")
        .await;
    assert_eq!(seek.status_code(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(&seek.as_bytes()[..], &body[1024..2048]);
    assert_eq!(upstream.redirect_hits(), 1);
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn open_ended_range_clamps_to_known_length() {
    let body = media_body();
    let upstream = TestUpstream::spawn(body.clone()).await;
    let server = test_server(&upstream.url, 3);

    server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-tail")
        .add_header("range", "bytes=0-0")
        .await;

    let tail = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-tail")
        .add_header("range", "bytes=4000-")
        .await;
    assert_eq!(tail.status_code(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(tail.header("content-range"), "bytes 4000-4095/4096");
    assert_eq!(&tail.as_bytes()[..], &body[4000..]);
}

#[tokio::test]
async fn out_of_bounds_range_is_unsatisfiable_once_length_is_known() {
    let upstream = TestUpstream::spawn(media_body()).await;
    let server = test_server(&upstream.url, 3);

    server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-416")
        .add_header("range", "bytes=0-0")
        .await;

    let response = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-416")
        .add_header("range", "bytes=999999-")
        .await;
    assert_eq!(response.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header("content-range"), "bytes */4096");
}

#[tokio::test]
async fn unknown_content_is_rejected_without_touching_upstream() {
    let upstream = TestUpstream::spawn(media_body()).await;
    let server = test_server(&upstream.url, 3);

    let missing = server
        .get("/proxy/vod/movie/no-such-movie")
        .add_query_param("session_id", "sess-404")
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    let envelope: Value = missing.json();
    assert_eq!(envelope["success"], false);

    let bad_kind = server
        .get("/proxy/vod/karaoke/m-1")
        .add_query_param("session_id", "sess-400")
        .await;
    assert_eq!(bad_kind.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn series_request_streams_its_first_episode() {
    let body = media_body();
    let upstream = TestUpstream::spawn(body.clone()).await;
    let server = test_server(&upstream.url, 3);

    let response = server
        .get("/proxy/vod/series/s-1")
        .add_query_param("session_id", "sess-series")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(&response.as_bytes()[..], &body[..]);
}

#[tokio::test]
async fn dead_upstream_maps_to_bad_gateway() {
    // nothing listens on this port
    let server = test_server("http://127.0.0.1:9/movie/1.mkv", 3);

    let response = server
        .get("/proxy/vod/movie/m-1")
        .add_query_param("session_id", "sess-down")
        .add_header("range", "bytes=0-10")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let envelope: Value = response.json();
    assert_eq!(envelope["success"], false);
}
