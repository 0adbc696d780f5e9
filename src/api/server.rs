//! API Server
//!
//! Serves the REST router with request tracing and a per-request timeout.
//! Dropping a timed-out request future cancels its store reads and cluster
//! commands; the client sees the same bare 500 as any other failure.

use crate::api::handlers::{router, AppState};
use crate::error::{Error, Result};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::{BoxError, Router};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::broadcast;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8124)),
            request_timeout_secs: 30,
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Router with tracing and timeout layers applied
    pub fn app(&self) -> Router {
        with_timeout(
            router(self.state.clone()),
            Duration::from_secs(self.config.request_timeout_secs),
        )
        .layer(TraceLayer::new_for_http())
    }

    /// Serve until [`ApiServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.rest_addr;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

        info!("REST API listening on {}", addr);

        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn handle_timeout(err: BoxError) -> StatusCode {
    warn!("Request aborted: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn with_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout))
            .layer(TimeoutLayer::new(timeout)),
    )
}
