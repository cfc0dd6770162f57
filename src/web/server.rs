//! Web server implementation using axum

use anyhow::{Context, Result};
use axum::http::Method;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use contact_gateway_core::config::WebSettings;
use contact_gateway_core::lookup::RequestGateway;

use super::{api, status_page};

/// Build the application router
pub fn build_router(gateway: Arc<RequestGateway>) -> Router {
    // Read-only API, callable from any page
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(status_page::index))
        .route("/search", get(api::search))
        .with_state(gateway)
        .layer(cors)
}

/// HTTP server in front of the request gateway
pub struct WebServer {
    settings: WebSettings,
    gateway: Arc<RequestGateway>,
}

impl WebServer {
    /// Create a new web server
    pub fn new(settings: WebSettings, gateway: Arc<RequestGateway>) -> Self {
        Self { settings, gateway }
    }

    /// Bind, call `on_listening`, then serve until Ctrl-C
    pub async fn run<F>(self, on_listening: F) -> Result<()>
    where
        F: FnOnce(),
    {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        tracing::info!(
            "Server running on http://localhost:{}",
            self.settings.port
        );
        on_listening();

        axum::serve(listener, build_router(self.gateway))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
