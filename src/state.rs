//! Shared application state for the proxy handler.
//!
//! Everything here is created once at startup and shared by reference:
//!
//! - **Configuration**: immutable, behind `Arc`
//! - **Forwarder**: wraps the single connection-pooling `reqwest::Client`
//! - **Target resolver**: upstream scheme/domain
//! - **Correlation counter**: atomic, shared with the correlation middleware
//!
//! Cloning `AppState` clones handles only, never the client or counter.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::CorrelationCounter;
use crate::services::{Forwarder, TargetResolver, build_http_client};

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Outbound request executor (shared HTTP client)
    pub forwarder: Forwarder,
    /// Path to upstream URL translation
    pub resolver: TargetResolver,
    /// Per-request serial issuer
    pub correlation: Arc<CorrelationCounter>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Create state with an HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(config: Config) -> AppResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Create state around an existing HTTP client.
    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        let forwarder = Forwarder::new(client, config.trusted_ip_header.clone());
        let resolver = TargetResolver::new(
            config.upstream_scheme.clone(),
            config.upstream_domain.clone(),
        );

        Self {
            config: Arc::new(config),
            forwarder,
            resolver,
            correlation: Arc::new(CorrelationCounter::new()),
            started_at: Instant::now(),
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
