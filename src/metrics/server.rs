//! HTTP server for the Prometheus metrics endpoint.

use crate::metrics::MetricsRegistry;
use crate::session::SessionSnapshot;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
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

impl MetricsServerConfig {
    /// Binds on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

#[derive(Clone)]
struct MetricsState {
    registry: Arc<MetricsRegistry>,
    session: watch::Receiver<SessionSnapshot>,
}

/// HTTP server exposing `/metrics` and `/health`.
///
/// Metrics are refreshed from the latest session snapshot on every
/// scrape.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: MetricsState,
}

impl MetricsServer {
    /// Serves `registry`, refreshed from `session` on each scrape.
    pub fn new(
        config: MetricsServerConfig,
        registry: MetricsRegistry,
        session: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            config,
            state: MetricsState {
                registry: Arc::new(registry),
                session,
            },
        }
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            "Metrics server listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let snapshot = state.session.borrow().clone();
    state.registry.update(&snapshot);

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

/// Reports the session state; the process itself is always healthy.
async fn health_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let session_state = state.session.borrow().state;
    (StatusCode::OK, format!("OK {}", session_state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_port() {
        let config = MetricsServerConfig::with_port(9464);
        assert_eq!(config.bind_addr.port(), 9464);
    }

    #[tokio::test]
    async fn test_handlers_reflect_session() {
        let (tx, rx) = watch::channel(SessionSnapshot::default());
        let state = MetricsState {
            registry: Arc::new(MetricsRegistry::new().unwrap()),
            session: rx,
        };

        tx.send_modify(|s| s.stats.frames_sent = 5);
        let _ = metrics_handler(State(state.clone())).await.into_response();
        let output = state.registry.encode().unwrap();
        assert!(output.contains("face_distance_frames_sent_total 5"));
    }
}
