//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Correlation    │ ← Assigns SRL-n serial, opens request span
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Concurrency    │ ← 503 when MAX_CONCURRENT_REQUESTS are in flight
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Proxy Key Auth  │ ← 401 if x-proxy-key is missing or wrong
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Request Timeout  │ ← Reads X-Request-Timeout
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! There is a single catch-all route: every method on every path goes to
//! [`handlers::proxy`]. The gateway exposes no endpoints of its own.

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::any;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    ConcurrencyLimitLayer, CorrelationLayer, ProxyKeyAuth, extract_request_timeout,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Middleware Configuration
///
/// - **Concurrency limit**: enabled if `max_concurrent_requests > 0`
/// - **Authentication**: always enabled; `PROXY_KEY` is mandatory
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let mut router = Router::new()
        .route("/", any(handlers::proxy))
        .route("/{*rest}", any(handlers::proxy));

    // Layers are listed innermost first; the last one added runs first.

    // 1. Client timeout header
    router = router.layer(from_fn(extract_request_timeout));

    // 2. Authentication
    router = router.layer(ProxyKeyAuth::new(
        config.proxy_key.clone(),
        config.trusted_ip_header.clone(),
    ));
    match &config.trusted_ip_header {
        Some(header) => info!(header = %header, "Client identity taken from trusted header"),
        None => info!("Client identity taken from socket address"),
    }

    // 3. Load shedding (if enabled)
    if config.concurrency_limit_enabled() {
        info!(
            max = config.max_concurrent_requests,
            "Concurrency limit enabled"
        );
        router = router.layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests));
    } else {
        info!("Concurrency limit disabled (MAX_CONCURRENT_REQUESTS=0)");
    }

    // 4. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 5. Correlation serial, outermost so every log line below carries it
    router = router.layer(CorrelationLayer::new(state.correlation.clone()));

    router.with_state(state)
}
