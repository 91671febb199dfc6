//! # Roproxy
//!
//! An authenticated HTTP forwarding gateway. A request for
//! `/{subdomain}/{path...}?{query}` carrying the shared `x-proxy-key` is
//! forwarded to `https://{subdomain}.roblox.com/{path...}?{query}` and the
//! upstream answer is relayed back unchanged.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Correlation → Trace → Concurrency → Auth)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handler (proxy)                                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Services (TargetResolver → Forwarder → relay)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Shared reqwest::Client (pooled, per-host keep-alive)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roproxy::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! PROXY_KEY=your-secret-key PORT=8000 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::{Config, LogFormat, ProxyKey};
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
