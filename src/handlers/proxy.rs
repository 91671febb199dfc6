//! The forwarding handler.
//!
//! Runs after the middleware stack has assigned a serial and accepted the
//! proxy key. Per request, strictly in order:
//!
//! 1. Resolve the upstream URL from the path (400 / 500 on failure)
//! 2. Buffer the inbound body up to `MAX_REQUEST_BODY_SIZE` (413)
//! 3. Forward on the shared client with the effective timeout
//! 4. Relay the outcome, exactly one response
//!
//! If the caller disconnects, hyper drops this future; the in-flight
//! `reqwest` call is dropped with it and its connection closed.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::response::Response;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::{CorrelationIdExt, RequestTimeout, client_identity_of};
use crate::services::{InboundRequest, relay};
use crate::state::AppState;

/// Forward any request to the upstream derived from its path.
pub async fn proxy(State(state): State<AppState>, req: Request) -> AppResult<Response> {
    let serial = req
        .correlation_id()
        .unwrap_or_else(|| state.correlation.next());
    let timeout = RequestTimeout::effective(
        req.extensions().get::<RequestTimeout>().copied(),
        state.config.upstream_timeout,
    );
    let client = client_identity_of(&req, state.config.trusted_ip_header.as_ref());

    let (parts, body) = req.into_parts();

    let (target, url) = state
        .resolver
        .resolve(parts.uri.path(), parts.uri.query())
        .inspect_err(|e| {
            warn!(serial = %serial, client = %client, error = %e, "Rejected request path");
            metrics::record_rejected(e.kind());
        })?;

    info!(
        serial = %serial,
        client = %client,
        subdomain = %target.subdomain,
        "({serial}) {client} -> {url}"
    );

    let body = axum::body::to_bytes(body, state.config.max_request_body_size)
        .await
        .map_err(|e| AppError::RequestBody(e.to_string()))
        .inspect_err(|e| {
            warn!(serial = %serial, error = %e, "Rejected request body");
            metrics::record_rejected(e.kind());
        })?;

    let started = Instant::now();
    let outcome = state
        .forwarder
        .forward(
            &url,
            InboundRequest {
                method: parts.method,
                headers: &parts.headers,
                body,
                client_identity: &client,
            },
            timeout,
        )
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match relay(outcome, &url) {
        Ok(response) => {
            info!(
                serial = %serial,
                status = response.status().as_u16(),
                elapsed_ms,
                "({serial}) {url} responded {}",
                response.status()
            );
            metrics::record_request("forwarded");
            Ok(response)
        }
        Err(e) => {
            // Full detail stays in the log; the caller only sees a fixed message
            error!(
                serial = %serial,
                status = e.status().as_u16(),
                elapsed_ms,
                error = %e,
                "({serial}) Error while making request to {url}"
            );
            metrics::record_request(e.kind());
            Err(e)
        }
    }
}
