//! HTTP server for the Prometheus metrics endpoint.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::session::ScanState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 9090).into(),
        }
    }
}

impl MetricsServerConfig {
    /// Creates a config with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

/// Shared state for the metrics server.
pub struct MetricsState {
    registry: MetricsRegistry,
    state: ScanState,
}

impl MetricsState {
    /// Updates the metrics from a snapshot.
    pub fn update(&mut self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
        self.state = snapshot.state;
    }
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<RwLock<MetricsState>>,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                state: ScanState::Idle,
            })),
        }
    }

    /// Returns the shared state for updating metrics.
    pub fn state(&self) -> Arc<RwLock<MetricsState>> {
        Arc::clone(&self.state)
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("Metrics server stopped");
        Ok(())
    }

    /// Runs the server until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    let state = state.read().await;

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint. Unhealthy while the session is in
/// the error state.
async fn health_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    let state = state.read().await.state;
    let status = if state == ScanState::Error {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, state.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
    }

    #[test]
    fn test_config_with_port() {
        let config = MetricsServerConfig::with_port(8080);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_state_tracks_snapshot() {
        let server = MetricsServer::new(
            MetricsServerConfig::default(),
            MetricsRegistry::new().unwrap(),
        );
        let state = server.state();

        state.write().await.update(&MetricsSnapshot {
            state: ScanState::Error,
            ..Default::default()
        });

        assert_eq!(state.read().await.state, ScanState::Error);
    }
}
