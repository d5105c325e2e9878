//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit_middleware, GateState};
use crate::config::ServerConfig;
use crate::error::{Result, WindowgateError};
use crate::ratelimit::{AdmissionBackend, RateLimiter};

/// Build the application router with every route behind the admission
/// middleware.
pub fn router<B: AdmissionBackend + 'static>(backend: Arc<B>, trust_forwarded_for: bool) -> Router {
    let gate = GateState::new(backend, trust_forwarded_for);

    Router::new()
        .route("/", get(welcome_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(gate, rate_limit_middleware::<B>))
}

async fn welcome_handler() -> &'static str {
    "Welcome to Windowgate"
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// HTTP server fronted by the admission layer.
pub struct HttpServer<B: AdmissionBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// Whether `X-Forwarded-For` names the client
    trust_forwarded_for: bool,
    /// The admission backend
    backend: Arc<B>,
}

impl HttpServer<RateLimiter> {
    /// Create a new HTTP server with a local rate limiter.
    pub fn new(config: &ServerConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self::with_backend(config, rate_limiter)
    }
}

impl<B: AdmissionBackend + 'static> HttpServer<B> {
    /// Create a new HTTP server with any admission backend.
    pub fn with_backend(config: &ServerConfig, backend: Arc<B>) -> Self {
        Self {
            addr: config.http_addr,
            trust_forwarded_for: config.trust_forwarded_for,
            backend,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            WindowgateError::Io(e)
        })?;

        info!(
            addr = %listener.local_addr()?,
            trust_forwarded_for = self.trust_forwarded_for,
            "Starting HTTP server with graceful shutdown"
        );

        let app = router(self.backend, self.trust_forwarded_for);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            WindowgateError::Io(e)
        })
    }
}
