//! Outbound request execution.
//!
//! The forwarder builds a fresh outbound request from the inbound method,
//! body and a *copy* of the inbound headers with a fixed set of overrides,
//! runs it on the shared connection-pooling client and reports the result
//! as an [`UpstreamOutcome`].
//!
//! # Header Rewrite
//!
//! | Header                         | Outbound value                 |
//! |--------------------------------|--------------------------------|
//! | `Natix-Roproxy-Forwarded-For`  | resolved client identity       |
//! | `Content-Type`, `Accept`       | `application/json`             |
//! | `User-Agent`                   | `Natix-Roproxy`                |
//! | `CF-Connecting-IP`, trusted IP | removed                        |
//! | `x-proxy-key`                  | removed                        |
//! | `Host`, `Content-Length`, hop-by-hop | removed (set by the client for the new connection) |
//!
//! Everything else passes through unchanged.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode};
use tracing::{debug, instrument};

use super::target::UpstreamUrl;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::PROXY_KEY_HEADER;

/// Header carrying the resolved client identity to the upstream.
pub const FORWARDED_FOR_HEADER: HeaderName =
    HeaderName::from_static("natix-roproxy-forwarded-for");

/// User agent presented to upstreams.
pub const PROXY_USER_AGENT: &str = "Natix-Roproxy";

/// Client address header set by Cloudflare; never forwarded from callers.
pub const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");

const JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Headers that describe the inbound connection rather than the request.
const CONNECTION_HEADERS: [HeaderName; 11] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// Build the shared upstream client from configuration.
///
/// The client pools connections per host (bounded by
/// `pool_max_idle_per_host`) and must be created once per process.
pub fn build_http_client(config: &Config) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .connect_timeout(config.upstream_connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .build()
        .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

/// Result of one outbound call.
///
/// A transport failure has no response at all, so it has no status either.
#[derive(Debug)]
pub enum UpstreamOutcome {
    /// Full body read.
    Success {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },
    /// No response was obtained (connect, DNS, TLS, timeout, ...).
    TransportFailure(reqwest::Error),
    /// The status line arrived but the body could not be read.
    ReadFailure {
        status: StatusCode,
        error: reqwest::Error,
    },
}

impl UpstreamOutcome {
    /// Metric/log label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            UpstreamOutcome::Success { .. } => "success",
            UpstreamOutcome::TransportFailure(e) if e.is_timeout() => "timeout",
            UpstreamOutcome::TransportFailure(_) => "transport_error",
            UpstreamOutcome::ReadFailure { error, .. } if error.is_timeout() => "timeout",
            UpstreamOutcome::ReadFailure { .. } => "read_error",
        }
    }
}

/// Inbound request parts the forwarder needs.
#[derive(Debug)]
pub struct InboundRequest<'a> {
    pub method: Method,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
    pub client_identity: &'a str,
}

/// Executes outbound requests on the shared client.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    trusted_header: Option<HeaderName>,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, trusted_header: Option<HeaderName>) -> Self {
        Self {
            client,
            trusted_header,
        }
    }

    /// Build the outbound header set from the inbound headers.
    ///
    /// The inbound map is never mutated; overrides are applied to a copy.
    pub fn outbound_headers(&self, inbound: &HeaderMap, client_identity: &str) -> HeaderMap {
        let mut headers = inbound.clone();

        for name in &CONNECTION_HEADERS {
            headers.remove(name);
        }
        headers.remove(PROXY_KEY_HEADER);
        headers.remove(CF_CONNECTING_IP);
        if let Some(trusted) = &self.trusted_header {
            headers.remove(trusted);
        }

        // A caller-supplied value never survives, even if ours cannot be encoded
        headers.remove(FORWARDED_FOR_HEADER);
        if let Ok(identity) = HeaderValue::from_str(client_identity) {
            headers.insert(FORWARDED_FOR_HEADER, identity);
        }
        headers.insert(header::CONTENT_TYPE, JSON);
        headers.insert(header::ACCEPT, JSON);
        headers.insert(header::USER_AGENT, HeaderValue::from_static(PROXY_USER_AGENT));

        headers
    }

    /// Send the request and read the whole response body.
    ///
    /// Never fails itself; every failure is reported in the outcome.
    #[instrument(skip_all, fields(upstream = %url, method = %inbound.method))]
    pub async fn forward(
        &self,
        url: &UpstreamUrl,
        inbound: InboundRequest<'_>,
        timeout: Duration,
    ) -> UpstreamOutcome {
        let headers = self.outbound_headers(inbound.headers, inbound.client_identity);
        let started = Instant::now();

        let response = match self
            .client
            .request(inbound.method, url.as_str())
            .headers(headers)
            .body(inbound.body)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                let outcome = UpstreamOutcome::TransportFailure(error);
                metrics::record_upstream(outcome.label(), started.elapsed());
                return outcome;
            }
        };

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        debug!(status = status.as_u16(), "Upstream responded, reading body");

        // `bytes` consumes the response; the connection goes back to the pool
        // or is closed on every path out of here.
        let outcome = match response.bytes().await {
            Ok(body) => UpstreamOutcome::Success {
                status,
                content_type,
                body,
            },
            Err(error) => UpstreamOutcome::ReadFailure { status, error },
        };
        metrics::record_upstream(outcome.label(), started.elapsed());
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn forwarder(trusted: Option<&'static str>) -> Forwarder {
        Forwarder::new(
            reqwest::Client::new(),
            trusted.map(HeaderName::from_static),
        )
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "proxy.example:8000".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "12".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
        headers.insert(header::COOKIE, ".ROBLOSECURITY=abc".parse().unwrap());
        headers.insert("x-csrf-token", "tok".parse().unwrap());
        headers.insert(PROXY_KEY_HEADER, "secret".parse().unwrap());
        headers.insert("cf-connecting-ip", "6.6.6.6".parse().unwrap());
        headers
    }

    #[test]
    fn test_overrides_applied() {
        let headers = forwarder(None).outbound_headers(&inbound(), "localhost:54321");

        assert_eq!(headers.get(FORWARDED_FOR_HEADER).unwrap(), "localhost:54321");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), PROXY_USER_AGENT);
    }

    #[test]
    fn test_spoofable_and_connection_headers_removed() {
        let headers = forwarder(None).outbound_headers(&inbound(), "1.2.3.4:5");

        assert!(headers.get("cf-connecting-ip").is_none());
        assert!(headers.get(PROXY_KEY_HEADER).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
    }

    #[test]
    fn test_other_headers_pass_through() {
        let headers = forwarder(None).outbound_headers(&inbound(), "1.2.3.4:5");

        assert_eq!(headers.get(header::COOKIE).unwrap(), ".ROBLOSECURITY=abc");
        assert_eq!(headers.get("x-csrf-token").unwrap(), "tok");
    }

    #[test]
    fn test_configured_trusted_header_removed() {
        let mut inbound = inbound();
        inbound.insert("x-real-ip", "9.9.9.9".parse().unwrap());

        let headers = forwarder(Some("x-real-ip")).outbound_headers(&inbound, "9.9.9.9");
        assert!(headers.get("x-real-ip").is_none());
        assert!(headers.get("cf-connecting-ip").is_none());
    }

    #[test]
    fn test_client_forwarded_for_is_overwritten() {
        let mut inbound = inbound();
        inbound.insert(FORWARDED_FOR_HEADER, "spoofed".parse().unwrap());

        let headers = forwarder(None).outbound_headers(&inbound, "10.0.0.1:1");
        let values: Vec<_> = headers.get_all(FORWARDED_FOR_HEADER).iter().collect();
        assert_eq!(values, vec!["10.0.0.1:1"]);
    }

    #[test]
    fn test_unencodable_identity_drops_forwarded_for() {
        let mut inbound = inbound();
        inbound.insert(FORWARDED_FOR_HEADER, "spoofed".parse().unwrap());

        let headers = forwarder(None).outbound_headers(&inbound, "bad\nidentity");
        assert!(headers.get(FORWARDED_FOR_HEADER).is_none());
    }

    #[test]
    fn test_inbound_headers_untouched() {
        let inbound = inbound();
        let before = inbound.clone();
        let _ = forwarder(None).outbound_headers(&inbound, "1.2.3.4:5");
        assert_eq!(inbound, before);
    }

    #[test]
    fn test_build_http_client_from_config() {
        let config = Config::with_proxy_key("k").unwrap();
        assert!(build_http_client(&config).is_ok());
    }
}
