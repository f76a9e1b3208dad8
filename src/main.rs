//! HealthTrail - Uptime and Latency Monitor
//!
//! Polls registered HTTP targets on their own intervals, stores health
//! samples in InfluxDB and serves aggregated views over HTTP.

mod config;
mod db;
mod metrics;
mod probe;
mod scheduler;
mod tsdb;
mod web;

use config::ServerConfig;
use db::{Store, TargetRegistry};
use scheduler::Scheduler;
use tsdb::InfluxClient;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // A missing .env file is fine; real deployments use the environment.
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("healthtrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting HealthTrail on port {}...", cfg.http_port);
    tracing::info!("Using target registry at {}", cfg.db_path);
    if cfg.tsdb.token.is_empty() {
        tracing::warn!("TSDB_TOKEN is not set; InfluxDB will likely reject requests");
    }

    // Initialize storage
    let registry = Arc::new(Store::new(&cfg.db_path)?);
    let tsdb = Arc::new(InfluxClient::new(&cfg.tsdb)?);
    tracing::info!("Writing samples to {} (bucket {})", cfg.tsdb.url, tsdb.bucket());

    // Seed the scheduler with every registered target
    let scheduler = Arc::new(Scheduler::new(tsdb.clone(), cfg.probe_timeout));
    let targets = registry.find_targets()?;
    let total = targets.len();
    let started = scheduler.register_all(targets).await;
    tracing::info!("Started monitoring {} of {} registered targets", started, total);

    // Start web server
    let server = Server::new(cfg, registry, tsdb, scheduler.clone());
    server.start(shutdown_signal()).await?;

    scheduler.shutdown().await;
    tracing::info!("HealthTrail stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
