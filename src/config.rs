//! Gateway configuration loaded from environment variables.
//!
//! Configuration is read once at startup (a `.env` file is honoured when
//! present), validated, and then shared read-only through [`AppState`].
//!
//! # Required
//!
//! - `PROXY_KEY`: shared secret callers must send in the `x-proxy-key` header.
//!   The process refuses to start without it.
//!
//! # Upstream
//!
//! - `UPSTREAM_SCHEME` / `UPSTREAM_DOMAIN`: `/{sub}/{rest}` is forwarded to
//!   `{scheme}://{sub}.{domain}/{rest}` (default `https` / `roblox.com`)
//! - `UPSTREAM_TIMEOUT_SECS`, `UPSTREAM_CONNECT_TIMEOUT_SECS`: outbound deadlines
//! - `POOL_MAX_IDLE_PER_HOST`, `POOL_IDLE_TIMEOUT_SECS`: connection pool bounds
//!
//! # Client Identity
//!
//! - `TRUSTED_IP_HEADER`: header whose value is preferred over the socket
//!   address when identifying the caller. Only set this when the listening
//!   edge overwrites the header itself.
//!
//! [`AppState`]: crate::state::AppState

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use subtle::ConstantTimeEq;
use tokio::sync::Semaphore;

use crate::error::{AppError, AppResult};

/// The shared secret callers authenticate with.
///
/// Fixed for the lifetime of the process. `Debug` is redacted so the whole
/// [`Config`] can be logged.
#[derive(Clone)]
pub struct ProxyKey(Arc<str>);

impl ProxyKey {
    /// Wrap a secret, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> AppResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AppError::ConfigError(
                "PROXY_KEY must not be empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(key)))
    }

    /// Compare a presented key against the secret in constant time.
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_bytes().ct_eq(presented).into()
    }
}

impl fmt::Debug for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProxyKey(<redacted>)")
    }
}

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Gateway configuration.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gateway will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8000)
    pub port: u16,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Secret expected in the `x-proxy-key` header
    pub proxy_key: ProxyKey,

    /// Header trusted to carry the real client address, `None` when disabled.
    /// The same header is always stripped from outbound requests.
    pub trusted_ip_header: Option<HeaderName>,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Scheme of synthesized upstream URLs (default: "https")
    pub upstream_scheme: String,

    /// Domain the subdomain segment is prefixed to (default: "roblox.com")
    pub upstream_domain: String,

    /// Total deadline for one outbound request, body included (default: 30s)
    pub upstream_timeout: Duration,

    /// Deadline for establishing an upstream connection (default: 10s)
    pub upstream_connect_timeout: Duration,

    /// Maximum idle pooled connections kept per upstream host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// How long an idle pooled connection is kept (default: 90s)
    pub pool_idle_timeout: Duration,

    // =========================================================================
    // Limits
    // =========================================================================
    /// Maximum requests handled at once, 0 = unbounded (default: 1024)
    pub max_concurrent_requests: usize,

    /// Maximum inbound request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `PROXY_KEY` is missing or any value
    /// is malformed.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let proxy_key = lookup("PROXY_KEY").ok_or_else(|| {
            AppError::ConfigError("PROXY_KEY not specified. Set it in .env.".to_string())
        })?;

        let config = Self {
            // Server
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT", 8000)?,

            // Security
            proxy_key: ProxyKey::new(proxy_key)?,
            trusted_ip_header: parse_header_name(&lookup, "TRUSTED_IP_HEADER")?,

            // Upstream
            upstream_scheme: lookup("UPSTREAM_SCHEME")
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or_else(|| "https".to_string()),
            upstream_domain: lookup("UPSTREAM_DOMAIN")
                .map(|s| s.trim().trim_matches('.').to_ascii_lowercase())
                .unwrap_or_else(|| "roblox.com".to_string()),
            upstream_timeout: Duration::from_secs(parse_var(&lookup, "UPSTREAM_TIMEOUT_SECS", 30)?),
            upstream_connect_timeout: Duration::from_secs(parse_var(
                &lookup,
                "UPSTREAM_CONNECT_TIMEOUT_SECS",
                10,
            )?),
            pool_max_idle_per_host: parse_var(&lookup, "POOL_MAX_IDLE_PER_HOST", 32)?,
            pool_idle_timeout: Duration::from_secs(parse_var(
                &lookup,
                "POOL_IDLE_TIMEOUT_SECS",
                90,
            )?),

            // Limits
            max_concurrent_requests: parse_var(&lookup, "MAX_CONCURRENT_REQUESTS", 1024)?,
            max_request_body_size: parse_var(
                &lookup,
                "MAX_REQUEST_BODY_SIZE",
                10 * 1024 * 1024,
            )?,

            // Observability
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format: parse_var(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
            metrics_port: parse_var(&lookup, "METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.upstream_scheme != "http" && self.upstream_scheme != "https" {
            return Err(AppError::ConfigError(format!(
                "UPSTREAM_SCHEME must be http or https, got '{}'",
                self.upstream_scheme
            )));
        }

        if self.upstream_domain.is_empty() {
            return Err(AppError::ConfigError(
                "UPSTREAM_DOMAIN must not be empty".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.upstream_connect_timeout.is_zero()
            || self.upstream_connect_timeout > self.upstream_timeout
        {
            return Err(AppError::ConfigError(format!(
                "UPSTREAM_CONNECT_TIMEOUT_SECS ({:?}) must be > 0 and <= UPSTREAM_TIMEOUT_SECS ({:?})",
                self.upstream_connect_timeout, self.upstream_timeout
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_requests > Semaphore::MAX_PERMITS {
            return Err(AppError::ConfigError(format!(
                "MAX_CONCURRENT_REQUESTS must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.max_concurrent_requests
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if client identity may be taken from a trusted header.
    pub fn trusted_header_enabled(&self) -> bool {
        self.trusted_ip_header.is_some()
    }

    /// Check if the in-flight request bound is active.
    pub fn concurrency_limit_enabled(&self) -> bool {
        self.max_concurrent_requests > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Development configuration with the given key and all other defaults.
    pub fn with_proxy_key(key: &str) -> AppResult<Self> {
        Self::from_lookup(|name| (name == "PROXY_KEY").then(|| key.to_string()))
    }
}

/// Parse a variable into the specified type with a default value.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}

/// Parse an optional header name. Unset or blank means disabled.
fn parse_header_name<F>(lookup: &F, name: &str) -> AppResult<Option<HeaderName>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => HeaderName::from_bytes(value.as_bytes())
            .map(Some)
            .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> AppResult<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config_values() {
        let config = load(&[("PROXY_KEY", "secret")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.upstream_scheme, "https");
        assert_eq!(config.upstream_domain, "roblox.com");
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.max_request_body_size, 10 * 1024 * 1024);
        assert!(config.trusted_ip_header.is_none());
        assert!(!config.trusted_header_enabled());
    }

    #[test]
    fn test_missing_proxy_key_is_fatal() {
        let err = load(&[("PORT", "9000")]).unwrap_err();
        assert!(err.to_string().contains("PROXY_KEY"));
    }

    #[test]
    fn test_empty_proxy_key_is_fatal() {
        let err = load(&[("PROXY_KEY", "")]).unwrap_err();
        assert!(err.to_string().contains("PROXY_KEY"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("PROXY_KEY", "k"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }

    #[test]
    fn test_trusted_header_enabled() {
        let config = load(&[("PROXY_KEY", "k"), ("TRUSTED_IP_HEADER", "CF-Connecting-IP")]).unwrap();
        assert_eq!(
            config.trusted_ip_header.as_ref().map(HeaderName::as_str),
            Some("cf-connecting-ip")
        );
        assert!(config.trusted_header_enabled());
    }

    #[test]
    fn test_blank_trusted_header_is_disabled() {
        let config = load(&[("PROXY_KEY", "k"), ("TRUSTED_IP_HEADER", "  ")]).unwrap();
        assert!(config.trusted_ip_header.is_none());
    }

    #[test]
    fn test_invalid_trusted_header_name() {
        let err = load(&[("PROXY_KEY", "k"), ("TRUSTED_IP_HEADER", "bad header")]).unwrap_err();
        assert!(err.to_string().contains("TRUSTED_IP_HEADER"));
    }

    #[test]
    fn test_validate_scheme() {
        let err = load(&[("PROXY_KEY", "k"), ("UPSTREAM_SCHEME", "ftp")]).unwrap_err();
        assert!(err.to_string().contains("UPSTREAM_SCHEME"));
    }

    #[test]
    fn test_validate_timeout_ordering() {
        let err = load(&[
            ("PROXY_KEY", "k"),
            ("UPSTREAM_TIMEOUT_SECS", "5"),
            ("UPSTREAM_CONNECT_TIMEOUT_SECS", "10"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("UPSTREAM_CONNECT_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validate_zero_body_size() {
        let err = load(&[("PROXY_KEY", "k"), ("MAX_REQUEST_BODY_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("MAX_REQUEST_BODY_SIZE"));
    }

    #[test]
    fn test_validate_concurrency_limit_bound() {
        let too_many = (Semaphore::MAX_PERMITS + 1).to_string();
        let err = load(&[("PROXY_KEY", "k"), ("MAX_CONCURRENT_REQUESTS", too_many.as_str())]).unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT_REQUESTS"));

        let huge = usize::MAX.to_string();
        let err = load(&[("PROXY_KEY", "k"), ("MAX_CONCURRENT_REQUESTS", huge.as_str())]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let max = Semaphore::MAX_PERMITS.to_string();
        let config = load(&[("PROXY_KEY", "k"), ("MAX_CONCURRENT_REQUESTS", max.as_str())]).unwrap();
        assert_eq!(config.max_concurrent_requests, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let config = load(&[("PROXY_KEY", "k")]).unwrap();
        assert_eq!(config.log_level, "info");

        let config = load(&[("PROXY_KEY", "k"), ("RUST_LOG", "roproxy=debug")]).unwrap();
        assert_eq!(config.log_level, "roproxy=debug");
    }

    #[test]
    fn test_upstream_domain_is_normalized() {
        let config = load(&[("PROXY_KEY", "k"), ("UPSTREAM_DOMAIN", ".Example.COM.")]).unwrap();
        assert_eq!(config.upstream_domain, "example.com");
    }

    #[test]
    fn test_log_format_parsing() {
        let config = load(&[("PROXY_KEY", "k"), ("LOG_FORMAT", "JSON")]).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(load(&[("PROXY_KEY", "k"), ("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_server_addr_format() {
        let config = load(&[("PROXY_KEY", "k"), ("HOST", "127.0.0.1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_proxy_key_debug_is_redacted() {
        let config = Config::with_proxy_key("super-secret").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_proxy_key_matches() {
        let key = ProxyKey::new("secret123").unwrap();
        assert!(key.matches(b"secret123"));
        assert!(!key.matches(b"secret456"));
        assert!(!key.matches(b"Secret123"));
        assert!(!key.matches(b"short"));
    }

    #[test]
    fn test_metrics_addr() {
        let config = load(&[("PROXY_KEY", "k"), ("METRICS_PORT", "0")]).unwrap();
        assert!(config.metrics_addr().is_none());

        let config = load(&[("PROXY_KEY", "k")]).unwrap();
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }
}
