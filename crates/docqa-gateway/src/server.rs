use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use docqa_index::{IngestionPipeline, QueryPipeline};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

/// Default request body limit: 50 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestionPipeline>,
    pub query: Arc<QueryPipeline>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(ingest: Arc<IngestionPipeline>, query: Arc<QueryPipeline>) -> Self {
        Self {
            ingest,
            query,
            started_at: Instant::now(),
        }
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    cors_origins: Vec<String>,
    max_body_size: usize,
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, state: AppState, shutdown_rx: watch::Receiver<bool>) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0, the API has no authentication");
        }

        Self {
            addr,
            cors_origins: Vec::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            state,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The fully layered router this server would serve.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.cors_origins, self.max_body_size)
    }

    /// Start the HTTP server and run until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
