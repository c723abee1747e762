//! HubLights - CI Check Suite Monitor
//!
//! Polls the check suites of configured repository branches and serves
//! their latest status over a JSON API.

mod config;
mod db;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use db::{load_config_set, SlotStore, Store};
use probe::{Fetcher, ReqwestTransport};
use reqwest::Url;
use scheduler::{Monitor, Persister, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("hublights=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting HubLights on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize storage and restore the saved targets
    let slots: Arc<dyn SlotStore> = Arc::new(Store::new(&cfg.db_path)?);
    let configs = load_config_set(slots.as_ref(), &cfg.storage_key);
    tracing::info!("Loaded {} targets", configs.len());

    // Create the monitor
    let transport = ReqwestTransport::new(cfg.request_timeout, cfg.github_token.clone())?;
    let fetcher = Fetcher::new(Arc::new(transport), Url::parse(&cfg.api_base)?);
    let monitor = Arc::new(Monitor::new(configs, fetcher));

    // Start background tasks
    let scheduler = Scheduler::new(monitor.clone());
    scheduler.start().await;

    let persister = Persister::new(
        monitor.clone(),
        slots,
        cfg.storage_key.clone(),
        cfg.persist_debounce,
    );
    persister.start();

    // Serve until Ctrl-C
    let server = Server::new(cfg, monitor);
    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down...");
        })
        .await?;

    scheduler.stop().await;
    persister.stop();
    persister.flush()?;

    Ok(())
}
