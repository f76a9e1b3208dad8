//! Web server module.

mod error;
mod handlers;

use crate::config::ServerConfig;
use crate::db::TargetRegistry;
use crate::scheduler::Scheduler;
use crate::tsdb::TimeSeriesStore;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<dyn TargetRegistry>,
    pub tsdb: Arc<dyn TimeSeriesStore>,
    pub scheduler: Arc<Scheduler>,
}

/// Web server for HealthTrail.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn TargetRegistry>,
        tsdb: Arc<dyn TimeSeriesStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                registry,
                tsdb,
                scheduler,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
        let config = &self.state.config;

        Router::new()
            // API endpoints
            .route("/target", post(handlers::handle_register_target))
            .route("/metrics/latency", get(handlers::handle_latency))
            .route("/metrics/availability", get(handlers::handle_availability))
            .route("/metrics/httpstatus", get(handlers::handle_http_status))
            // Status page and assets
            .route_service("/", ServeFile::new(&config.index_path))
            .nest_service("/static", ServeDir::new(&config.static_dir))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
