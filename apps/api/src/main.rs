mod config;
mod errors;
mod matching;
mod routes;
mod scoring_client;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::matching::orchestrator::Orchestrator;
use crate::routes::build_router;
use crate::scoring_client::ScoringClient;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Matchboard API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize scoring client
    let scoring = ScoringClient::new(config.scoring_service_url.clone(), config.scoring_timeout());
    info!(
        "Scoring client initialized ({}, timeout {}s)",
        config.scoring_service_url, config.scoring_timeout_secs
    );

    // Build app state
    let state = AppState {
        orchestrator: Orchestrator::new(Arc::new(scoring)),
        sessions: SessionStore::new(),
        config: config.clone(),
    };

    // Drop sessions abandoned by their tab
    tokio::spawn(
        state
            .sessions
            .clone()
            .run_eviction(config.session_ttl(), config.session_sweep_interval()),
    );
    info!("Idle sessions expire after {}s", config.session_ttl_secs);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
