//! HTTP server hosting the planner

use std::future::Future;

use tokio::net::TcpListener;

use super::{router, AppState};
use crate::config::ServerConfig;
use crate::types::RuntimeError;

/// Planner web server
pub struct WebServer {
    config: ServerConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// Serve until Ctrl-C
    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` completes
    pub async fn serve_until<F>(&self, shutdown: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RuntimeError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("Planner web server listening on {}", addr);

        let app = router(self.state.clone(), &self.config);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RuntimeError::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Planner web server stopped");
        Ok(())
    }
}
