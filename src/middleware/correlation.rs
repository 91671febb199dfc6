//! Per-request correlation serials.
//!
//! Every inbound request is assigned the next value of a process-wide
//! atomic counter (`SRL-1`, `SRL-2`, ...) when it enters the middleware
//! stack. The serial is stored in request extensions and recorded on a
//! `tracing` span wrapping the rest of the request, so the inbound and
//! outcome log lines of one request can be paired.
//!
//! Serials are a logging aid only. They are not sent upstream and carry no
//! security meaning.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, info_span};

/// A per-request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SRL-{}", self.0)
    }
}

/// Issues unique, monotonically increasing correlation ids.
///
/// Safe to share between concurrently running requests: `next` is a single
/// atomic `fetch_add`, so no value is ever issued twice or skipped.
#[derive(Debug, Default)]
pub struct CorrelationCounter {
    last: AtomicU64,
}

impl CorrelationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id. The first id is `SRL-1`.
    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Correlation layer for Tower middleware stack.
#[derive(Clone)]
pub struct CorrelationLayer {
    counter: Arc<CorrelationCounter>,
}

impl CorrelationLayer {
    pub fn new(counter: Arc<CorrelationCounter>) -> Self {
        Self { counter }
    }
}

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService {
            inner,
            counter: self.counter.clone(),
        }
    }
}

/// Correlation service wrapper.
#[derive(Clone)]
pub struct CorrelationService<S> {
    inner: S,
    counter: Arc<CorrelationCounter>,
}

impl<S> Service<Request<Body>> for CorrelationService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let serial = self.counter.next();
        req.extensions_mut().insert(serial);

        let span = info_span!(
            "request",
            serial = %serial,
            method = %req.method(),
        );

        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move { inner.call(req).await }.instrument(span))
    }
}

/// Extension trait to read the correlation id from requests.
pub trait CorrelationIdExt {
    fn correlation_id(&self) -> Option<CorrelationId>;
}

impl<B> CorrelationIdExt for Request<B> {
    fn correlation_id(&self) -> Option<CorrelationId> {
        self.extensions().get::<CorrelationId>().copied()
    }
}
