//! Proxy key authentication middleware.
//!
//! Every request must carry the shared secret in the `x-proxy-key` header.
//! The check runs before any other pipeline stage, so a rejected request
//! never reaches the target resolver or the upstream.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: Prevents timing attacks on key validation
//! - **Header only**: Keys in query strings would end up in upstream URLs and logs
//! - **No bypass paths**: Every path is a forwarding path
//!
//! ```bash
//! curl -H "x-proxy-key: your-secret-key" http://localhost:8000/users/v1/users/1
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::identity::client_identity_of;
use crate::config::ProxyKey;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Header name for the proxy key.
pub const PROXY_KEY_HEADER: &str = "x-proxy-key";

/// Check the proxy key header against the configured secret.
///
/// Exact, case-sensitive match. A missing header, a non-visible-ASCII value
/// and a wrong value are all rejected the same way.
pub fn authorize(headers: &HeaderMap, expected: &ProxyKey) -> AppResult<()> {
    match headers.get(PROXY_KEY_HEADER) {
        Some(value) if expected.matches(value.as_bytes()) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// Proxy key authentication layer.
#[derive(Clone)]
pub struct ProxyKeyAuth {
    expected_key: ProxyKey,
    trusted_header: Option<Arc<axum::http::HeaderName>>,
}

impl ProxyKeyAuth {
    /// Create a new auth layer.
    ///
    /// # Arguments
    ///
    /// * `proxy_key` - The secret every request must present
    /// * `trusted_header` - Used only to identify rejected callers in logs
    pub fn new(proxy_key: ProxyKey, trusted_header: Option<axum::http::HeaderName>) -> Self {
        Self {
            expected_key: proxy_key,
            trusted_header: trusted_header.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for ProxyKeyAuth {
    type Service = ProxyKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyKeyAuthService {
            inner,
            expected_key: self.expected_key.clone(),
            trusted_header: self.trusted_header.clone(),
        }
    }
}

/// Proxy key authentication service wrapper.
#[derive(Clone)]
pub struct ProxyKeyAuthService<S> {
    inner: S,
    expected_key: ProxyKey,
    trusted_header: Option<Arc<axum::http::HeaderName>>,
}

impl<S> Service<Request<Body>> for ProxyKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = authorize(req.headers(), &self.expected_key);

        if let Err(err) = verdict {
            let client = client_identity_of(&req, self.trusted_header.as_deref());
            warn!(
                client = %client,
                path = %req.uri().path(),
                key_present = req.headers().contains_key(PROXY_KEY_HEADER),
                "Rejected request with invalid proxy key"
            );
            metrics::record_rejected("unauthorized");
            return Box::pin(async move { Ok(err.into_response()) });
        }

        debug!("Proxy key accepted");
        let mut inner = self.inner.clone();
        // Swap so the ready service handles this request
        std::mem::swap(&mut self.inner, &mut inner);
        Box::pin(async move { inner.call(req).await })
    }
}
