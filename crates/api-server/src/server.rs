//! HTTP server configuration and startup

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use pricefeed_aggregator::PriceAggregator;
use pricefeed_core::ServerConfig;

use crate::handlers::{create_router, AppState};

/// REST server wrapper
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, aggregator: Arc<PriceAggregator>) -> Self {
        Self {
            config,
            state: AppState { aggregator },
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` fires
    pub async fn start_with_shutdown(
        &self,
        shutdown: tokio::sync::oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        let addr: SocketAddr = self.address().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Starting HTTP server on {} (with graceful shutdown)", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                shutdown.await.ok();
                info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    /// Get server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}
