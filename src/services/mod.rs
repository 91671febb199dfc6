//! Forwarding pipeline stages.
//!
//! - [`TargetResolver`]: request path → validated upstream URL
//! - [`Forwarder`]: header rewrite and outbound execution
//! - [`relay`]: upstream outcome → caller response

pub mod forwarder;
pub mod relay;
pub mod target;

pub use forwarder::{Forwarder, InboundRequest, UpstreamOutcome, build_http_client};
pub use relay::relay;
pub use target::{TargetResolver, UpstreamTarget, UpstreamUrl};
