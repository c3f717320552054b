//! Slack request signing.
//!
//! Every request carries `X-Slack-Request-Timestamp` and `X-Slack-Signature`.
//! The signature is `v0=` followed by the hex HMAC-SHA256 of
//! `v0:{timestamp}:{raw body}` keyed with the app's signing secret.
//! Comparison is constant-time and the timestamp must fall inside a replay
//! window around the local clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const VERSION: &str = "v0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("{0} header is not valid ASCII")]
    InvalidHeader(&'static str),
    #[error("request timestamp is not an integer")]
    InvalidTimestamp,
    #[error("request timestamp is {skew_secs}s away from local time")]
    Stale { skew_secs: u64 },
    #[error("signature is not a v0 hex digest")]
    Malformed,
    #[error("signing key rejected")]
    InvalidKey,
    #[error("signature mismatch")]
    Mismatch,
}

fn signer(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// Compute the `v0=<hex>` signature Slack would send for this body.
pub fn compute_signature(
    secret: &[u8],
    timestamp: &str,
    body: &[u8],
) -> Result<String, SignatureError> {
    let digest = signer(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{VERSION}={}", hex::encode(digest)))
}

/// Verify a signature against the raw body.
///
/// `now` and `window` bound how far the supplied timestamp may drift in
/// either direction.
pub fn verify_signature(
    secret: &[u8],
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: SystemTime,
    window: Duration,
) -> Result<(), SignatureError> {
    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    let now_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let skew_secs = now_secs.abs_diff(sent_at);
    if skew_secs > window.as_secs() {
        return Err(SignatureError::Stale { skew_secs });
    }

    let supplied = signature
        .strip_prefix(VERSION)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or(SignatureError::Malformed)?;
    let supplied = hex::decode(supplied).map_err(|_| SignatureError::Malformed)?;

    signer(secret, timestamp, body)?
        .verify_slice(&supplied)
        .map_err(|_| SignatureError::Mismatch)
}

/// Pull the signing headers out of a request and verify them.
pub fn verify_request(
    headers: &HeaderMap,
    body: &[u8],
    secret: &[u8],
    now: SystemTime,
    window: Duration,
) -> Result<(), SignatureError> {
    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let signature = header_str(headers, SIGNATURE_HEADER)?;
    verify_signature(secret, timestamp, body, signature, now, window)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .ok_or(SignatureError::MissingHeader(name))?
        .to_str()
        .map_err(|_| SignatureError::InvalidHeader(name))
}

/// Constant-time comparison of a configured token with a supplied one.
pub fn tokens_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
