//! Client-specified upstream deadline.
//!
//! A caller may shorten the outbound timeout for a single request with the
//! `X-Request-Timeout` header (milliseconds):
//!
//! ```text
//! X-Request-Timeout: 5000
//! ```
//!
//! The value is validated here and stored in request extensions. The
//! forwarder uses `min(client value, UPSTREAM_TIMEOUT_SECS)`, so a client can
//! only ever shorten the configured deadline. Out-of-range or malformed
//! values are ignored.

use std::time::Duration;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

/// Minimum accepted client timeout (100ms).
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Maximum accepted client timeout (5 minutes).
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Header name for client-specified request timeout.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// Validated client timeout, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout {
    pub duration: Duration,
}

impl RequestTimeout {
    /// Returns `None` if the value is outside the allowed range.
    pub fn from_millis(ms: u64) -> Option<Self> {
        (MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS)
            .contains(&ms)
            .then(|| Self {
                duration: Duration::from_millis(ms),
            })
    }

    /// Deadline to apply given the configured upstream timeout.
    pub fn effective(timeout: Option<Self>, configured: Duration) -> Duration {
        match timeout {
            Some(t) => t.duration.min(configured),
            None => configured,
        }
    }
}

/// Middleware that extracts and validates the `X-Request-Timeout` header.
pub async fn extract_request_timeout(mut request: Request, next: Next) -> Response {
    if let Some(value) = request.headers().get(REQUEST_TIMEOUT_HEADER)
        && let Ok(value_str) = value.to_str()
    {
        match value_str.trim().parse::<u64>().ok().and_then(RequestTimeout::from_millis) {
            Some(timeout) => {
                debug!(timeout_ms = timeout.duration.as_millis() as u64, "Client requested upstream timeout");
                request.extensions_mut().insert(timeout);
            }
            None => {
                debug!(
                    value = value_str,
                    min = MIN_REQUEST_TIMEOUT_MS,
                    max = MAX_REQUEST_TIMEOUT_MS,
                    "Ignoring invalid X-Request-Timeout header"
                );
            }
        }
    }

    next.run(request).await
}
