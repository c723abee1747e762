//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::scheduler::Monitor;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub monitor: Arc<Monitor>,
}

/// JSON API over the monitor.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, monitor: Arc<Monitor>) -> Self {
        Self {
            state: AppState { config, monitor },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route(
                "/api/targets",
                get(handlers::handle_list_targets)
                    .post(handlers::handle_create_target)
                    .delete(handlers::handle_remove_targets),
            )
            .route("/api/targets/move", post(handlers::handle_move_targets))
            .route(
                "/api/targets/{id}",
                get(handlers::handle_get_target)
                    .put(handlers::handle_update_target)
                    .delete(handlers::handle_delete_target),
            )
            .route("/api/targets/{id}/status", get(handlers::handle_get_status))
            .route("/api/targets/{id}/raw", get(handlers::handle_get_raw))
            .route(
                "/api/targets/{id}/check",
                post(handlers::handle_check_now).delete(handlers::handle_cancel_check),
            )
            .route("/api/check", post(handlers::handle_check_all))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
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
