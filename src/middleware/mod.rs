//! HTTP middleware wrapped around the forwarding handler.
//!
//! # Architecture
//!
//! ```text
//! Request → Correlation → Trace → Concurrency → Auth → Timeout → Handler
//!               ↓                      ↓           ↓        ↓
//!         SRL-n span/ext        503 when full  401 Unauth  ext
//! ```
//!
//! # Security Considerations
//!
//! - Proxy key comparison uses constant-time equality
//! - Auth runs before the path is even parsed; rejected requests never
//!   produce outbound traffic
//! - The trusted client header is opt-in and always stripped upstream

pub mod auth;
pub mod concurrency;
pub mod correlation;
pub mod identity;
pub mod timeout;

pub use auth::{PROXY_KEY_HEADER, ProxyKeyAuth, authorize};
pub use concurrency::ConcurrencyLimitLayer;
pub use correlation::{CorrelationCounter, CorrelationId, CorrelationIdExt, CorrelationLayer};
pub use identity::{UNKNOWN_CLIENT, client_identity_of, resolve_client_identity};
pub use timeout::{
    MAX_REQUEST_TIMEOUT_MS, MIN_REQUEST_TIMEOUT_MS, REQUEST_TIMEOUT_HEADER, RequestTimeout,
    extract_request_timeout,
};
