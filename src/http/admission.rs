//! Admission gate for webhook requests.
//!
//! Checks run cheapest first and stop at the first failure:
//! method → content type → bounded body read → JSON parse → authenticity.
//! Nothing past the gate ever sees a request that failed one of them.

use std::time::{Duration, SystemTime};

use axum::extract::Request;
use axum::http::{header, HeaderMap, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, Secret};
use crate::events::parser::ParseError;
use crate::security::limits::{read_capped, BodyReadError};
use crate::security::media_type::{parse_media_type, MediaTypeError, APPLICATION_JSON};
use crate::security::signature::{tokens_match, verify_request, SignatureError};

/// Why a request was turned away.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("unexpected HTTP method {0}")]
    MethodNotAllowed(Method),
    #[error("failed to parse Content-Type: {0}")]
    InvalidContentType(#[source] MediaTypeError),
    #[error("content type was not JSON: {0}")]
    UnsupportedMediaType(String),
    #[error(transparent)]
    BodyRead(#[from] BodyReadError),
    #[error("failed to unmarshal JSON document: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("request signature rejected: {0}")]
    Unauthenticated(#[from] SignatureError),
    #[error("verification token mismatch")]
    TokenMismatch,
    #[error("delivery is for app {0}")]
    AppMismatch(String),
    #[error("delivery is for team {0}")]
    TeamMismatch(String),
    #[error("failed to parse values from JSON document: {0}")]
    InvalidEvent(#[from] ParseError),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::InvalidContentType(_) => StatusCode::BAD_REQUEST,
            Rejection::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Rejection::MalformedJson(_) | Rejection::InvalidEvent(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Rejection::Unauthenticated(_)
            | Rejection::TokenMismatch
            | Rejection::AppMismatch(_)
            | Rejection::TeamMismatch(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::MethodNotAllowed(_) => "method_not_allowed",
            Rejection::InvalidContentType(_) => "invalid_content_type",
            Rejection::UnsupportedMediaType(_) => "unsupported_media_type",
            Rejection::BodyRead(_) => "body_read_failed",
            Rejection::MalformedJson(_) => "malformed_json",
            Rejection::Unauthenticated(_) => "bad_signature",
            Rejection::TokenMismatch => "bad_token",
            Rejection::AppMismatch(_) => "wrong_app",
            Rejection::TeamMismatch(_) => "wrong_team",
            Rejection::InvalidEvent(_) => "invalid_event",
        }
    }
}

/// A request that passed every check.
#[derive(Debug)]
pub struct AdmittedRequest {
    pub document: Value,
    /// Bytes read from the body, after truncation.
    pub body_len: usize,
}

/// Per-request validation with limits taken from the config snapshot.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    signing_secret: Secret,
    verification_token: Secret,
    app_id: String,
    team_id: String,
    max_body_bytes: usize,
    read_timeout: Duration,
    replay_window: Duration,
}

impl AdmissionGate {
    pub fn from_config(config: &Config) -> Self {
        Self {
            signing_secret: config.slack.request_secret.clone(),
            verification_token: config.slack.request_token.clone(),
            app_id: config.slack.app_id.clone(),
            team_id: config.slack.team_id.clone(),
            max_body_bytes: config.server.max_body_bytes,
            read_timeout: config.server.read_timeout(),
            replay_window: config.server.replay_window(),
        }
    }

    /// Run every check and return the parsed document.
    pub async fn admit(&self, request: Request) -> Result<AdmittedRequest, Rejection> {
        let (parts, body) = request.into_parts();

        check_method(&parts.method)?;
        check_content_type(&parts.headers)?;

        let body = read_capped(body, self.max_body_bytes, self.read_timeout).await?;
        if body.truncated {
            tracing::warn!(
                limit = self.max_body_bytes,
                "Request body exceeded limit, truncated"
            );
        }

        let document: Value =
            serde_json::from_slice(&body.bytes).map_err(Rejection::MalformedJson)?;

        verify_request(
            &parts.headers,
            &body.bytes,
            self.signing_secret.expose().as_bytes(),
            SystemTime::now(),
            self.replay_window,
        )?;
        self.check_token(&document)?;
        self.check_origin(&document)?;

        Ok(AdmittedRequest {
            document,
            body_len: body.bytes.len(),
        })
    }

    /// Legacy token check, only when a token is configured and one was sent.
    fn check_token(&self, document: &Value) -> Result<(), Rejection> {
        if self.verification_token.is_empty() {
            return Ok(());
        }
        match document.get("token").and_then(Value::as_str) {
            Some(token) if !tokens_match(self.verification_token.expose(), token) => {
                Err(Rejection::TokenMismatch)
            }
            _ => Ok(()),
        }
    }

    /// Deliveries must be for the configured app and workspace, when those
    /// are configured and the document names them.
    fn check_origin(&self, document: &Value) -> Result<(), Rejection> {
        if let Some(app_id) = mismatched(&self.app_id, document, "api_app_id") {
            return Err(Rejection::AppMismatch(app_id.to_owned()));
        }
        if let Some(team_id) = mismatched(&self.team_id, document, "team_id") {
            return Err(Rejection::TeamMismatch(team_id.to_owned()));
        }
        Ok(())
    }
}

fn mismatched<'a>(expected: &str, document: &'a Value, field: &str) -> Option<&'a str> {
    if expected.is_empty() {
        return None;
    }
    document
        .get(field)
        .and_then(Value::as_str)
        .filter(|supplied| *supplied != expected)
}

pub fn check_method(method: &Method) -> Result<(), Rejection> {
    if method == Method::POST {
        Ok(())
    } else {
        Err(Rejection::MethodNotAllowed(method.clone()))
    }
}

pub fn check_content_type(headers: &HeaderMap) -> Result<(), Rejection> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().map_err(|_| MediaTypeError::InvalidToken))
        .transpose()
        .map_err(Rejection::InvalidContentType)?
        .unwrap_or_default();

    let media_type = parse_media_type(value).map_err(Rejection::InvalidContentType)?;
    if media_type != APPLICATION_JSON {
        return Err(Rejection::UnsupportedMediaType(media_type));
    }
    Ok(())
}
