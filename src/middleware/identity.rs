//! Client identity resolution.
//!
//! Derives the display string used for the caller in log lines and in the
//! forwarder-identity header sent upstream.
//!
//! # Resolution Order
//!
//! 1. The configured trusted header, when enabled, present, valid UTF-8 and
//!    non-empty after trimming
//! 2. The raw socket address of the connection (`ConnectInfo`)
//! 3. [`UNKNOWN_CLIENT`] when neither is available (e.g. in-process tests)
//!
//! An address beginning with `127.0.0.1` is shown as `localhost` with the
//! rest (usually `:port`) kept. This is cosmetic only.
//!
//! # Security Warning
//!
//! The trusted header is client-controlled unless the listening edge
//! overwrites it. Only configure `TRUSTED_IP_HEADER` behind a proxy that
//! sets the header itself. Independently of this setting, the forwarder
//! strips that header from outbound requests.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};

/// Fallback identity when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const LOOPBACK_LITERAL: &str = "127.0.0.1";

/// Resolve the display identity of a caller.
///
/// Pure function: `trusted_header` is the configured header name (if any),
/// `remote` the connection's socket address (if known).
pub fn resolve_client_identity(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    trusted_header: Option<&HeaderName>,
) -> String {
    let raw: Cow<'_, str> = match trusted_value(headers, trusted_header) {
        Some(value) => Cow::Borrowed(value),
        None => match remote {
            Some(addr) => Cow::Owned(addr.to_string()),
            None => Cow::Borrowed(UNKNOWN_CLIENT),
        },
    };

    prettify_loopback(&raw)
}

/// Resolve the identity straight from a request, reading `ConnectInfo`
/// from its extensions.
pub fn client_identity_of<B>(req: &Request<B>, trusted_header: Option<&HeaderName>) -> String {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    resolve_client_identity(req.headers(), remote, trusted_header)
}

#[inline]
fn trusted_value<'a>(headers: &'a HeaderMap, trusted_header: Option<&HeaderName>) -> Option<&'a str> {
    let name = trusted_header?;
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}

#[inline]
fn prettify_loopback(raw: &str) -> String {
    match raw.strip_prefix(LOOPBACK_LITERAL) {
        Some(rest) => format!("localhost{rest}"),
        None => raw.to_string(),
    }
}
