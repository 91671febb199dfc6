//! Request path to upstream URL translation.
//!
//! `/{subdomain}/{rest...}?{query}` maps to
//! `{scheme}://{subdomain}.{domain}/{rest...}?{query}`.
//!
//! The path is used as received (still percent-encoded), segments are kept
//! in order and re-joined without any re-encoding, and the query string is
//! appended verbatim. No network activity happens here.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::error::{AppError, AppResult};

/// Where one inbound request is forwarded to. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub subdomain: String,
    pub path_remainder: Vec<String>,
    pub query: Option<String>,
}

impl UpstreamTarget {
    /// Split a request path into subdomain and remainder.
    ///
    /// # Errors
    ///
    /// `AppError::PathFormat` unless the subdomain segment and at least one
    /// remainder segment are non-empty.
    pub fn parse(path: &str, query: Option<&str>) -> AppResult<Self> {
        let mut parts = path.split('/');

        // Everything before the first '/' must be empty for an origin-form path
        if parts.next().is_some_and(|leading| !leading.is_empty()) {
            return Err(AppError::PathFormat(format!(
                "path '{path}' does not start with '/'"
            )));
        }

        let subdomain = match parts.next() {
            Some(sub) if !sub.is_empty() => sub.to_string(),
            _ => {
                return Err(AppError::PathFormat(format!(
                    "path '{path}' has no subdomain segment"
                )));
            }
        };

        let path_remainder: Vec<String> = parts.map(str::to_string).collect();
        if path_remainder.iter().all(String::is_empty) {
            return Err(AppError::PathFormat(format!(
                "path '{path}' has no upstream path after the subdomain"
            )));
        }

        Ok(Self {
            subdomain,
            path_remainder,
            query: query.map(str::to_string),
        })
    }

    /// Expected upstream host for this target.
    pub fn host(&self, domain: &str) -> String {
        format!("{}.{domain}", self.subdomain)
    }

    /// Synthesize the upstream URL string.
    pub fn to_url_string(&self, scheme: &str, domain: &str) -> String {
        let mut url = format!("{scheme}://{}", self.host(domain));
        for segment in &self.path_remainder {
            url.push('/');
            url.push_str(segment);
        }
        if let Some(query) = &self.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// A synthesized upstream URL that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamUrl(String);

impl UpstreamUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves request paths against one upstream scheme and domain.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    scheme: String,
    domain: String,
}

impl TargetResolver {
    pub fn new(scheme: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            domain: domain.into(),
        }
    }

    /// Parse the path and build a validated upstream URL.
    ///
    /// # Errors
    ///
    /// - `AppError::PathFormat` for too few path segments
    /// - `AppError::UrlBuild` if the URL is not a well-formed absolute URI,
    ///   or if its host is not exactly `{subdomain}.{domain}`
    pub fn resolve(&self, path: &str, query: Option<&str>) -> AppResult<(UpstreamTarget, UpstreamUrl)> {
        let target = UpstreamTarget::parse(path, query)?;
        let url = self.build_url(&target)?;
        Ok((target, url))
    }

    /// Build and validate the upstream URL for an already parsed target.
    pub fn build_url(&self, target: &UpstreamTarget) -> AppResult<UpstreamUrl> {
        let raw = target.to_url_string(&self.scheme, &self.domain);

        let parsed = Url::parse(&raw).map_err(|e| AppError::UrlBuild(format!("{raw}: {e}")))?;

        // Characters such as '#', '@' or '?' in the subdomain segment would
        // otherwise move the request to a different host.
        let expected_host = target.host(&self.domain);
        let host_matches = parsed
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&expected_host));
        if !host_matches || parsed.port().is_some() {
            return Err(AppError::UrlBuild(format!(
                "{raw}: host {:?} is not {expected_host}",
                parsed.host_str()
            )));
        }

        debug!(upstream = %raw, "Resolved upstream URL");
        Ok(UpstreamUrl(raw))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn roblox() -> TargetResolver {
        TargetResolver::new("https", "roblox.com")
    }

    #[test]
    fn test_resolves_users_endpoint() {
        let (target, url) = roblox().resolve("/users/v1/users/123", None).unwrap();
        assert_eq!(target.subdomain, "users");
        assert_eq!(target.path_remainder, vec!["v1", "users", "123"]);
        assert_eq!(url.as_str(), "https://users.roblox.com/v1/users/123");
    }

    #[test]
    fn test_preserves_query_verbatim() {
        let (_, url) = roblox()
            .resolve("/games/v1/games", Some("universeIds=1,2&x=%20y"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://games.roblox.com/v1/games?universeIds=1,2&x=%20y"
        );
    }

    #[test]
    fn test_preserves_encoded_segments_and_trailing_slash() {
        let (_, url) = roblox()
            .resolve("/thumbnails/v1/a%2Fb/c%20d/", None)
            .unwrap();
        assert_eq!(url.as_str(), "https://thumbnails.roblox.com/v1/a%2Fb/c%20d/");
    }

    #[test]
    fn test_preserves_empty_inner_segments() {
        let (_, url) = roblox().resolve("/users/v1//x", None).unwrap();
        assert_eq!(url.as_str(), "https://users.roblox.com/v1//x");
    }

    #[test]
    fn test_rejects_too_few_segments() {
        for path in ["/", "/users", "/users/", "/users//", "//v1/users", ""] {
            let result = roblox().resolve(path, None);
            assert!(
                matches!(result, Err(AppError::PathFormat(_))),
                "expected PathFormat for {path:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_rejects_invalid_host_characters() {
        let result = roblox().resolve("/us er/v1/x", None);
        assert!(matches!(result, Err(AppError::UrlBuild(_))));
    }

    #[test]
    fn test_rejects_host_escape() {
        for path in ["/evil.com#/x", "/a@evil.com/x", "/evil.com:8080#/x", "/evil.com?/x"] {
            let result = roblox().resolve(path, None);
            assert!(
                matches!(result, Err(AppError::UrlBuild(_))),
                "expected UrlBuild for {path:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_subdomain_case_is_accepted() {
        let (_, url) = roblox().resolve("/Users/v1/users/1", None).unwrap();
        assert_eq!(url.as_str(), "https://Users.roblox.com/v1/users/1");
    }

    #[test]
    fn test_custom_scheme_and_domain() {
        let resolver = TargetResolver::new("http", "roblox.test");
        let (_, url) = resolver.resolve("/catalog/v2/search", None).unwrap();
        assert_eq!(url.as_str(), "http://catalog.roblox.test/v2/search");
    }

    #[test]
    fn test_to_url_string_joins_in_order() {
        let target = UpstreamTarget {
            subdomain: "friends".into(),
            path_remainder: vec!["v1".into(), "users".into(), "1".into(), "friends".into()],
            query: None,
        };
        assert_eq!(
            target.to_url_string("https", "roblox.com"),
            "https://friends.roblox.com/v1/users/1/friends"
        );
    }
}
