use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ezinstall::api::{self, AppState};
use ezinstall::config::{Cli, Config};
use ezinstall::recorder::EventRecorder;
use ezinstall::region::{self, classify, RegionResolver};
use ezinstall::storage;

/// Looked up once at startup so a broken database shows up in the logs
const WARM_UP_IP: &str = "114.114.114.114";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::load(Cli::parse())?;
    info!("Loaded configuration");

    // Load region database
    let index = region::open_index(&config.region)?;
    let resolver = RegionResolver::new(index);
    let warm_up = resolver.resolve(WARM_UP_IP);
    info!(
        ip = WARM_UP_IP,
        region = ?warm_up,
        classification = ?classify(&warm_up),
        "Region database ready"
    );

    // Connect storage
    let storage = storage::connect(&config.store)
        .await
        .context("Failed to initialize open event storage")?;

    let recorder = Arc::new(EventRecorder::new(
        storage,
        config.recorder.dedup_window_secs,
    ));
    info!(
        window_secs = recorder.window_secs(),
        "Open events deduplicated per app and IP"
    );

    let state = Arc::new(AppState {
        resolver,
        recorder,
        trust_proxy_headers: config.server.trust_proxy_headers,
    });
    let router = api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
