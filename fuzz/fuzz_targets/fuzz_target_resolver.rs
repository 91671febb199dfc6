//! Fuzz testing for request path resolution.
//!
//! Feeds arbitrary paths and query strings to the target resolver and checks
//! that it never panics and that every URL it accepts points at a host under
//! the configured domain.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_target_resolver
//! cargo +nightly fuzz run fuzz_target_resolver -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roproxy::services::TargetResolver;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    path: &'a str,
    query: Option<&'a str>,
}

fuzz_target!(|input: Input<'_>| {
    let resolver = TargetResolver::new("https", "roblox.com");

    if let Ok((target, url)) = resolver.resolve(input.path, input.query) {
        let parsed = url::Url::parse(url.as_str()).expect("accepted URL must parse");
        let host = parsed.host_str().expect("accepted URL must have a host");

        assert!(host.ends_with(".roblox.com"), "escaped to {host}");
        assert!(host.eq_ignore_ascii_case(&target.host("roblox.com")));
        assert!(!target.subdomain.is_empty());
    }
});
