use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Message returned to callers that fail the proxy key check.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid proxy key supplied!";

/// Message returned to callers whose path cannot be mapped to an upstream.
pub const PATH_FORMAT_MESSAGE: &str = "Invalid URL path. Format is: (host)/subdomain/actual/path";

/// Message returned when the synthesized upstream URL is rejected.
pub const URL_BUILD_MESSAGE: &str = "Error while building URL";

/// Gateway error types with appropriate HTTP status codes.
///
/// Every stage of the forwarding pipeline fails fast with one of these;
/// nothing is retried. Upstream variants carry the full error for
/// server-side logging, but only a fixed message ever reaches the caller.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing or invalid proxy key")]
    Unauthorized,

    #[error("Malformed request path: {0}")]
    PathFormat(String),

    #[error("Failed to build upstream URL: {0}")]
    UrlBuild(String),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("Upstream request to {url} failed: {source}")]
    UpstreamTransport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream request to {url} timed out: {source}")]
    UpstreamTimeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read upstream response body from {url} (status {status}): {source}")]
    UpstreamRead {
        url: String,
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Too many requests in flight")]
    Overloaded,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Short machine-readable kind, used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::PathFormat(_) => "invalid_path",
            AppError::UrlBuild(_) => "url_build_error",
            AppError::RequestBody(_) => "request_body_error",
            AppError::UpstreamTransport { .. } => "upstream_transport_error",
            AppError::UpstreamTimeout { .. } => "upstream_timeout",
            AppError::UpstreamRead { .. } => "upstream_read_error",
            AppError::Overloaded => "overloaded",
            AppError::ConfigError(_) => "config_error",
        }
    }

    /// Status code written to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PathFormat(_) => StatusCode::BAD_REQUEST,
            AppError::RequestBody(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // The upstream status is only relayed when it already signals failure;
            // a 2xx paired with an error body would mislead the caller.
            AppError::UpstreamRead { status, .. }
                if status.is_client_error() || status.is_server_error() =>
            {
                *status
            }
            AppError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UrlBuild(_)
            | AppError::UpstreamTransport { .. }
            | AppError::UpstreamRead { .. }
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Never includes internal error detail.
    fn public_message(&self) -> &'static str {
        match self {
            AppError::Unauthorized => UNAUTHORIZED_MESSAGE,
            AppError::PathFormat(_) => PATH_FORMAT_MESSAGE,
            AppError::UrlBuild(_) => URL_BUILD_MESSAGE,
            AppError::RequestBody(_) => "Request body is too large or could not be read",
            AppError::UpstreamTransport { .. } => {
                "Proxy encountered error while making request to upstream"
            }
            AppError::UpstreamTimeout { .. } => "Upstream did not respond in time",
            AppError::UpstreamRead { .. } => {
                "Proxy encountered error while reading the upstream response"
            }
            AppError::Overloaded => "Proxy is at capacity. Please retry later.",
            AppError::ConfigError(_) => "Service configuration error",
        }
    }
}

/// Error response body written to callers.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.kind(),
            message: self.public_message(),
        };

        let mut response = (status, axum::Json(body)).into_response();
        match self {
            AppError::Unauthorized => {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", HeaderValue::from_static("Proxy-Key"));
            }
            AppError::Overloaded => {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from_static("1"));
            }
            _ => {}
        }
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
