//! HTTP server: listener, middleware stack and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::api::routes;
use crate::downloader::DownloadService;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;

/// Listener and middleware settings.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Largest accepted request body. Cookie files travel in the download
    /// request, so this is more than a JSON form needs.
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            body_limit: 1024 * 1024,
        }
    }
}

impl ApiServerConfig {
    /// Defaults overridden by `API_BIND_ADDRESS`, `API_PORT` and
    /// `SERIKA_ENABLE_CORS`. Unusable values are ignored.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("API_BIND_ADDRESS")
            && !address.trim().is_empty()
        {
            config.bind_address = address.trim().to_string();
        }

        if let Ok(raw) = std::env::var("API_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %raw, "Ignoring invalid API_PORT"),
            }
        }

        if let Ok(raw) = std::env::var("SERIKA_ENABLE_CORS") {
            match parse_flag(&raw) {
                Some(enabled) => config.enable_cors = enabled,
                None => warn!(value = %raw, "Ignoring invalid SERIKA_ENABLE_CORS"),
            }
        }

        config
    }

    fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid listen address: {e}")))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    /// Job supervisor; also owns the registry and config.
    pub downloads: Arc<DownloadService>,
    /// Absent when the global subscriber was not installed (tests).
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new(downloads: Arc<DownloadService>) -> Self {
        Self {
            start_time: Instant::now(),
            downloads,
            logging_config: None,
        }
    }

    pub fn with_logging(self, logging_config: Arc<LoggingConfig>) -> Self {
        Self {
            logging_config: Some(logging_config),
            ..self
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Stop when `cancel_token` fires instead of a private token.
    pub fn with_cancel_token(self, cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            ..self
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// The full router with middleware. Only `/api` requests are traced;
    /// health checks arrive every few seconds and would drown the log.
    pub fn build_router(&self) -> Router {
        let traced = routes::api_routes().layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    info_span!("http", method = %req.method(), uri = %req.uri())
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

        let mut router = traced
            .nest("/health", routes::health::router())
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers(Any),
            );
        }
        router
    }

    /// Serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "API server listening");

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("API server shutting down");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {e}")))
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
