//! Response construction.
//!
//! # Responsibilities
//! - Map admission rejections to status codes and hint headers
//! - Echo the URL verification challenge
//!
//! # Design Decisions
//! - Error bodies are empty; the reason only goes to the logs
//! - 405 carries `Allow`, 400 and 415 carry `Accept`

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::admission::Rejection;

/// Media type advertised in `Accept` when the request body is refused.
pub const ACCEPT_JSON: HeaderValue = HeaderValue::from_static("application/json; charset=utf-8");

/// Content type used for the challenge echo. Slack ignores it.
pub const CHALLENGE_CONTENT_TYPE: HeaderValue = HeaderValue::from_static("plain/text");

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = status.into_response();
        let headers = response.headers_mut();

        match status {
            StatusCode::METHOD_NOT_ALLOWED => {
                headers.insert(header::ALLOW, HeaderValue::from_static("POST"));
            }
            StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                headers.insert(header::ACCEPT, ACCEPT_JSON);
            }
            _ => {}
        }
        response
    }
}

/// Answer a URL verification handshake.
pub fn challenge(challenge: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CHALLENGE_CONTENT_TYPE)],
        challenge,
    )
        .into_response()
}

/// Acknowledge an accepted event.
pub fn accepted() -> Response {
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::media_type::MediaTypeError;
    use axum::http::Method;

    #[test]
    fn method_rejection_advertises_post() {
        let response = Rejection::MethodNotAllowed(Method::GET).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
        assert!(response.headers().get(header::ACCEPT).is_none());
    }

    #[test]
    fn media_rejections_advertise_json() {
        for rejection in [
            Rejection::InvalidContentType(MediaTypeError::Empty),
            Rejection::UnsupportedMediaType("text/plain".into()),
        ] {
            let response = rejection.into_response();
            assert_eq!(
                response.headers()[header::ACCEPT],
                "application/json; charset=utf-8"
            );
        }
    }

    #[test]
    fn unauthenticated_has_no_hints() {
        let response = Rejection::TokenMismatch.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::ALLOW).is_none());
        assert!(response.headers().get(header::ACCEPT).is_none());
    }

    #[test]
    fn challenge_is_echoed() {
        let response = challenge("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".into());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "plain/text");
    }
}
