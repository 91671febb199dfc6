//! Upstream outcome to caller response.

use axum::body::Body;
use axum::http::header;
use axum::response::Response;

use super::forwarder::UpstreamOutcome;
use super::target::UpstreamUrl;
use crate::error::{AppError, AppResult};

/// Turn an upstream outcome into exactly one caller response.
///
/// Success is relayed verbatim (status, body and the upstream content type).
/// Every failure becomes an [`AppError`], whose response never includes the
/// partial upstream body.
pub fn relay(outcome: UpstreamOutcome, url: &UpstreamUrl) -> AppResult<Response> {
    match outcome {
        UpstreamOutcome::Success {
            status,
            content_type,
            body,
        } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            if let Some(content_type) = content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
            }
            Ok(response)
        }
        UpstreamOutcome::TransportFailure(source) if source.is_timeout() => {
            Err(AppError::UpstreamTimeout {
                url: url.to_string(),
                source,
            })
        }
        UpstreamOutcome::TransportFailure(source) => Err(AppError::UpstreamTransport {
            url: url.to_string(),
            source,
        }),
        UpstreamOutcome::ReadFailure { error, .. } if error.is_timeout() => {
            Err(AppError::UpstreamTimeout {
                url: url.to_string(),
                source: error,
            })
        }
        UpstreamOutcome::ReadFailure { status, error } => Err(AppError::UpstreamRead {
            url: url.to_string(),
            status,
            source: error,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::body::Bytes;
    use axum::http::{HeaderValue, StatusCode};

    use super::*;
    use crate::services::TargetResolver;

    fn url() -> UpstreamUrl {
        TargetResolver::new("https", "roblox.com")
            .resolve("/users/v1/users/1", None)
            .unwrap()
            .1
    }

    #[tokio::test]
    async fn test_success_relayed_verbatim() {
        let outcome = UpstreamOutcome::Success {
            status: StatusCode::OK,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"ok":true}"#),
        };

        let response = relay(outcome, &url()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_upstream_error_status_passes_through() {
        let outcome = UpstreamOutcome::Success {
            status: StatusCode::TOO_MANY_REQUESTS,
            content_type: None,
            body: Bytes::from_static(br#"{"errors":[{"code":0}]}"#),
        };

        let response = relay(outcome, &url()).unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
