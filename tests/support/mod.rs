//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Response, StatusCode, header};
use axum::routing::get;
use axum_test::TestServer;
use chrono::Utc;

use vod_proxy::catalog::StaticCatalog;
use vod_proxy::config::{
    CatalogConfig, Config, ContentEntry, ProfileEntry, StoreBackend,
};
use vod_proxy::proxy::{ProfileLimiter, SessionRegistry, StreamEngine};
use vod_proxy::store::{MemoryStore, SharedStore};
use vod_proxy::utils::UpstreamClients;
use vod_proxy::web::{AppState, create_router};

/// In-process media origin with single-range support and a one-hop
/// redirect entry point mimicking a provider's load balancer.
pub struct TestUpstream {
    pub url: String,
    pub redirect_url: String,
    hits: Arc<AtomicUsize>,
    redirect_hits: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct UpstreamState {
    body: Arc<Vec<u8>>,
    hits: Arc<AtomicUsize>,
    redirect_hits: Arc<AtomicUsize>,
}

impl TestUpstream {
    pub async fn spawn(body: Vec<u8>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let redirect_hits = Arc::new(AtomicUsize::new(0));
        let state = UpstreamState {
            body: Arc::new(body),
            hits: hits.clone(),
            redirect_hits: redirect_hits.clone(),
        };
        let app = Router::new()
            .route("/media/{name}", get(serve_media))
            .route("/start/{name}", get(serve_redirect))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test upstream");
        let addr = listener.local_addr().expect("test upstream addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test upstream serve");
        });

        Self {
            url: format!("http://{addr}/media/video.mkv"),
            redirect_url: format!("http://{addr}/start/video.mkv"),
            hits,
            redirect_hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn redirect_hits(&self) -> usize {
        self.redirect_hits.load(Ordering::SeqCst)
    }
}

async fn serve_redirect(
    State(state): State<UpstreamState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Response<Body> {
    state.redirect_hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, format!("/media/{name}"))
        .body(Body::empty())
        .expect("redirect response")
}

async fn serve_media(State(state): State<UpstreamState>, headers: HeaderMap) -> Response<Body> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let total = state.body.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    match range {
        Some((start, end)) if start < total => {
            let end = end.min(total - 1);
            let slice = state.body[start..=end].to_vec();
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "video/x-matroska")
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{total}"),
                )
                .header(header::CONTENT_LENGTH, slice.len())
                .body(Body::from(slice))
                .expect("range response")
        }
        Some(_) => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total}"))
            .body(Body::empty())
            .expect("416 response"),
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "video/x-matroska")
            .header(header::CONTENT_LENGTH, total)
            .body(Body::from(state.body.as_ref().clone()))
            .expect("full response"),
    }
}

fn parse_range(raw: &str) -> Option<(usize, usize)> {
    let (start, end) = raw.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        usize::MAX
    } else {
        end.parse().ok()?
    };
    Some((start, end))
}

/// Full application wired against the in-memory store.
pub fn test_server(upstream_url: &str, max_streams: u64) -> TestServer {
    TestServer::new(create_router(test_state(upstream_url, max_streams))).expect("test server")
}

pub fn test_state(upstream_url: &str, max_streams: u64) -> AppState {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.catalog = CatalogConfig {
        profiles: vec![
            ProfileEntry {
                id: "main".to_string(),
                name: "main-profile".to_string(),
                max_streams,
                search_pattern: None,
                replace_pattern: None,
                user_agent_pattern: None,
                is_default: true,
            },
            ProfileEntry {
                id: "vlc".to_string(),
                name: "vlc-profile".to_string(),
                max_streams,
                search_pattern: None,
                replace_pattern: None,
                user_agent_pattern: Some("(?i)vlc".to_string()),
                is_default: false,
            },
        ],
        content: vec![
            ContentEntry {
                id: "m-1".to_string(),
                name: "Some Movie".to_string(),
                kind: "movie".to_string(),
                url: Some(upstream_url.to_string()),
                episodes: vec![],
            },
            ContentEntry {
                id: "e-1".to_string(),
                name: "S01E01".to_string(),
                kind: "episode".to_string(),
                url: Some(upstream_url.to_string()),
                episodes: vec![],
            },
            ContentEntry {
                id: "s-1".to_string(),
                name: "Some Series".to_string(),
                kind: "series".to_string(),
                url: None,
                episodes: vec!["e-1".to_string()],
            },
        ],
    };

    let store: SharedStore = Arc::new(MemoryStore::new());
    let limiter = Arc::new(ProfileLimiter::new(store.clone()));
    let registry = SessionRegistry::new(
        store.clone(),
        limiter,
        &config.store,
        &config.session,
    );
    let clients = UpstreamClients::new(&config.upstream).expect("upstream clients");
    let engine = Arc::new(StreamEngine::new(registry, clients, &config.session));
    let catalog = Arc::new(StaticCatalog::new(&config.catalog));

    AppState {
        config: Arc::new(config),
        store,
        engine,
        catalog: catalog.clone(),
        profiles: catalog,
        start_time: Utc::now(),
    }
}
