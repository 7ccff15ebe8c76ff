//! Axum server setup, shared director state, and graceful shutdown.
//!
//! Contains [`Director`] (the `Arc`-shared state holding the validated
//! config, the pooled HTTP client, and the metrics reporter),
//! [`build_router`] for the catch-all Axum router with middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::model::ProxyConfig;
use crate::config::validation::{self, DirectorConfig};
use crate::error::DirectorError;
use crate::metrics::{NoopReporter, Reporter, StatsdReporter};
use crate::proxy;

/// Idle connections kept per backend host.
pub const MAX_IDLE_PER_HOST: usize = 100;

/// Largest inbound body buffered for forwarding, in bytes.
pub const DEFAULT_MAX_BODY: usize = 10 * 1024 * 1024;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

/// Everything a request needs, fixed at construction and shared read-only.
pub struct Director {
    pub config: DirectorConfig,
    pub http_client: HttpClient,
    pub reporter: Arc<dyn Reporter>,
    /// Bodies larger than this are rejected with 413 before any backend
    /// is called.
    pub max_body: usize,
}

impl Director {
    /// Director with the no-op reporter.
    #[must_use]
    pub fn new(config: DirectorConfig) -> Self {
        Self {
            config,
            http_client: build_http_client(),
            reporter: Arc::new(NoopReporter),
            max_body: DEFAULT_MAX_BODY,
        }
    }

    /// Validate `raw` and wire up the reporter it asks for.
    ///
    /// Fails without side effects if the config is invalid or the StatsD
    /// socket cannot be set up.
    pub fn from_config(raw: Option<&ProxyConfig>) -> Result<Self, DirectorError> {
        Self::from_validated(validation::validate(raw)?)
    }

    /// Director for an already validated config: StatsD reporter when a
    /// service address is configured, no-op otherwise.
    pub fn from_validated(config: DirectorConfig) -> Result<Self, DirectorError> {
        let reporter: Arc<dyn Reporter> = match config.metrics.statsd_service.as_deref() {
            Some(addr) => Arc::new(StatsdReporter::new(addr)?),
            None => Arc::new(NoopReporter),
        };
        Ok(Self::new(config).with_reporter(reporter))
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build(https)
}

pub fn build_router(state: Arc<Director>) -> Router {
    Router::new()
        .fallback(proxy::forward_handler)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
