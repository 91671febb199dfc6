//! Prometheus metrics for the gateway.
//!
//! Metrics are exposed on a dedicated listener (`METRICS_PORT`, default 9090),
//! never on the proxy port, so every proxy path stays behind the key check.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `roproxy_requests_total` - Completed requests (label: outcome)
//! - `roproxy_upstream_errors_total` - Failed upstream calls (label: kind)
//! - `roproxy_rejected_requests_total` - Requests refused before forwarding (label: reason)
//!
//! ## Histograms
//! - `roproxy_upstream_duration_seconds` - Outbound call duration (label: outcome)
//!
//! ## Gauges
//! - `roproxy_in_flight_requests` - Requests currently holding a concurrency permit
//!
//! Recording functions are safe to call before (or without) the exporter
//! being installed; the `metrics` facade drops them silently.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "roproxy_requests_total";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "roproxy_upstream_errors_total";
    pub const REJECTED_REQUESTS_TOTAL: &str = "roproxy_rejected_requests_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "roproxy_upstream_duration_seconds";
    pub const IN_FLIGHT_REQUESTS: &str = "roproxy_in_flight_requests";
}

/// Install the Prometheus exporter and its HTTP listener.
///
/// # Errors
///
/// Returns a message if the recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of proxied requests by outcome"
    );
    describe_counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "Total number of failed upstream calls by kind"
    );
    describe_counter!(
        names::REJECTED_REQUESTS_TOTAL,
        "Total number of requests refused before forwarding"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream call duration in seconds"
    );
    describe_gauge!(
        names::IN_FLIGHT_REQUESTS,
        "Requests currently being processed"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a completed request. `outcome` is `forwarded` or an error kind.
pub fn record_request(outcome: &str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

/// Record a request refused by auth, path validation or load shedding.
pub fn record_rejected(reason: &str) {
    counter!(names::REJECTED_REQUESTS_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Record one outbound call.
///
/// Anything other than `success` also counts as an upstream error.
pub fn record_upstream(outcome: &str, elapsed: Duration) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "outcome" => outcome.to_string())
        .record(elapsed.as_secs_f64());
    if outcome != "success" {
        counter!(names::UPSTREAM_ERRORS_TOTAL, "kind" => outcome.to_string()).increment(1);
    }
}

/// Move the in-flight gauge by `delta`.
pub fn adjust_in_flight(delta: f64) {
    let gauge = gauge!(names::IN_FLIGHT_REQUESTS);
    if delta >= 0.0 {
        gauge.increment(delta);
    } else {
        gauge.decrement(-delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed here; these only verify the calls are inert.

    #[test]
    fn test_record_request() {
        record_request("forwarded");
        record_request("upstream_timeout");
    }

    #[test]
    fn test_record_rejected() {
        record_rejected("unauthorized");
    }

    #[test]
    fn test_record_upstream() {
        record_upstream("success", Duration::from_millis(12));
        record_upstream("transport_error", Duration::from_millis(3));
    }

    #[test]
    fn test_adjust_in_flight() {
        adjust_in_flight(1.0);
        adjust_in_flight(-1.0);
    }
}
