//! Web server module
//!
//! HTTP surface of the proxy: the streaming endpoints under `/proxy/vod`,
//! the session management API under `/api/v1`, and the health probes.

pub mod extractors;
pub mod handlers;
pub mod responses;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get},
};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::catalog::{ContentCatalog, ProfileSelector};
use crate::config::Config;
use crate::proxy::StreamEngine;
use crate::store::SharedStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub engine: Arc<StreamEngine>,
    pub catalog: Arc<dyn ContentCatalog>,
    pub profiles: Arc<dyn ProfileSelector>,
    pub start_time: DateTime<Utc>,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub async fn run(self) -> Result<()> {
        info!("Web server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install shutdown handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Build the full application router. Exposed so tests can drive the
/// service without binding a socket.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/live", get(handlers::health::live))
        .route(
            "/proxy/vod/{content_type}/{content_id}",
            get(handlers::vod::serve_vod),
        )
        .route(
            "/proxy/vod/{content_type}/{content_id}/{profile_id}",
            get(handlers::vod::serve_vod_with_profile),
        )
        .route("/api/v1/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/v1/sessions/{session_id}",
            delete(handlers::sessions::delete_session),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
