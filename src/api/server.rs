//! API server setup: middleware stack and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::engine::Engine;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// HTTP boundary over the settlement engine.
pub struct ApiServer {
    config: ApiConfig,
    engine: Arc<Engine>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, engine: Arc<Engine>) -> Self {
        Self { config, engine }
    }

    /// Serve until a shutdown signal arrives, then stop the engine loops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.get_socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);

        let engine = Arc::clone(&self.engine);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        engine.shutdown();
        info!("API server stopped");
        Ok(())
    }

    /// Create the application with the middleware stack
    fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState { engine: Arc::clone(&self.engine) });

        create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            // Timeout layer
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
