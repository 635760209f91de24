//! VOD proxy service entry point

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vod_proxy::catalog::StaticCatalog;
use vod_proxy::config::Config;
use vod_proxy::proxy::{CleanupSweeper, ProfileLimiter, SessionRegistry, StreamEngine};
use vod_proxy::store;
use vod_proxy::utils::UpstreamClients;
use vod_proxy::web::{AppState, WebServer};

#[derive(Parser)]
#[command(name = "vod-proxy")]
#[command(about = "VOD proxy with per-profile limits and shared session state")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the bind host from the config file
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port from the config file
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vod_proxy={},tower_http=warn", cli.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting vod-proxy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let store = store::connect(&config.store).await?;
    store
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("Shared store unreachable at startup: {}", e))?;
    info!("Connected to {:?} store", config.store.backend);

    let catalog = Arc::new(StaticCatalog::new(&config.catalog));
    let limiter = Arc::new(ProfileLimiter::new(store.clone()));
    let registry = SessionRegistry::new(
        store.clone(),
        limiter,
        &config.store,
        &config.session,
    );
    let clients = UpstreamClients::new(&config.upstream)?;
    let engine = Arc::new(StreamEngine::new(
        registry.clone(),
        clients,
        &config.session,
    ));

    let sweeper = CleanupSweeper::new(registry, &config.session);
    tokio::spawn(sweeper.run());

    let state = AppState {
        config: Arc::new(config),
        store,
        engine,
        catalog: catalog.clone(),
        profiles: catalog,
        start_time: Utc::now(),
    };

    WebServer::new(state)?.run().await
}
