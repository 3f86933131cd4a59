// Sync Service - periodic delegation sync for tracked validator accounts
// Seeds the registry, runs the sync scheduler and serves health/metrics/stats

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use delegation_sync::{InMemoryRegistry, InMemoryStore, RemoteFetcher, SyncOrchestrator};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod scheduler;

use config::Config;
use handlers::AppState;
use scheduler::SyncScheduler;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Sync service starting...");

    let config = Config::from_env()?;

    let registry = Arc::new(InMemoryRegistry::new());
    for account in config.tracked_accounts.iter().cloned() {
        if let Err(e) = registry.add(account) {
            warn!("Skipping tracked account: {}", e);
        }
    }
    if registry.is_empty() {
        warn!("TRACKED_ACCOUNTS is empty; cycles will have nothing to sync");
    }

    let fetcher = Arc::new(RemoteFetcher::new(config.engine.fetcher.clone())?);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        registry,
        Arc::new(InMemoryStore::new()),
        fetcher,
        config.engine.sync.clone(),
    ));

    info!(
        upstream = %config.engine.fetcher.base_url,
        max_concurrent = config.engine.sync.max_concurrent,
        "Delegation sync engine initialized"
    );

    let mut scheduler = SyncScheduler::new(orchestrator.clone(), config.trigger.clone()).await?;
    scheduler.start().await?;

    let server_port = config.server_port;
    info!("Starting HTTP server on port {}", server_port);

    let state = web::Data::new(AppState { orchestrator });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", server_port))
    .with_context(|| format!("Failed to bind port {}", server_port))?
    .run()
    .await?;

    info!("HTTP server stopped, shutting down scheduler");
    scheduler.stop().await
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
