//! Bounded in-flight requests.
//!
//! Each request must take a permit from a shared semaphore before it enters
//! the pipeline. When none is free the request is shed immediately with
//! `503 Service Unavailable` and `Retry-After: 1` instead of queueing, so a
//! slow upstream cannot pile up unbounded work in the gateway.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;
use crate::metrics;

/// Concurrency limit layer for Tower middleware stack.
#[derive(Clone)]
pub struct ConcurrencyLimitLayer {
    permits: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimitLayer {
    /// Allow at most `max` requests in flight. `max` must be non-zero.
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<S> Layer<S> for ConcurrencyLimitLayer {
    type Service = ConcurrencyLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConcurrencyLimitService {
            inner,
            permits: self.permits.clone(),
            max: self.max,
        }
    }
}

/// Concurrency limit service wrapper.
#[derive(Clone)]
pub struct ConcurrencyLimitService<S> {
    inner: S,
    permits: Arc<Semaphore>,
    max: usize,
}

impl<S> Service<Request<Body>> for ConcurrencyLimitService<S>
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
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    max_in_flight = self.max,
                    path = %req.uri().path(),
                    "Shedding request, concurrency limit reached"
                );
                metrics::record_rejected("overloaded");
                return Box::pin(async { Ok(AppError::Overloaded.into_response()) });
            }
        };

        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let _in_flight = InFlight::enter(permit);
            inner.call(req).await
        })
    }
}

/// Holds a permit for the lifetime of one request.
///
/// Released on drop, which also covers a request future cancelled by a
/// disconnecting caller.
struct InFlight {
    _permit: OwnedSemaphorePermit,
}

impl InFlight {
    fn enter(permit: OwnedSemaphorePermit) -> Self {
        metrics::adjust_in_flight(1.0);
        Self { _permit: permit }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::adjust_in_flight(-1.0);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use tokio::sync::oneshot;
    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;

    #[tokio::test]
    async fn test_sheds_when_saturated() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

        let inner = service_fn(move |_req: Request<Body>| {
            let release_rx = release_rx.clone();
            async move {
                if let Some(rx) = release_rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<_, std::convert::Infallible>(Response::new(Body::empty()))
            }
        });

        let layer = ConcurrencyLimitLayer::new(1);
        let service = layer.layer(inner);

        let first = tokio::spawn(
            service
                .clone()
                .oneshot(Request::builder().body(Body::empty()).unwrap()),
        );

        // Wait for the first request to take the only permit
        while layer.available() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = service
            .clone()
            .oneshot(Request::builder().body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

        release_tx.send(()).unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(layer.available(), 1);
    }
}
