//! Content-Type negotiation.
//!
//! Parses a `Content-Type` header value into its lowercased media type.
//! Parameters are checked for basic well-formedness and then ignored.

use thiserror::Error;

/// The only media type the webhook endpoint accepts.
pub const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("no media type")]
    Empty,
    #[error("expected token after slash")]
    MissingSubtype,
    #[error("invalid media type")]
    InvalidToken,
    #[error("invalid media parameter")]
    InvalidParameter,
}

/// Parse a header value, returning the bare media type (e.g. `application/json`).
pub fn parse_media_type(value: &str) -> Result<String, MediaTypeError> {
    let mut parts = value.split(';');
    let essence = parts.next().unwrap_or_default().trim();
    if essence.is_empty() {
        return Err(MediaTypeError::Empty);
    }

    let (kind, subtype) = match essence.split_once('/') {
        Some((kind, subtype)) => (kind.trim(), Some(subtype.trim())),
        None => (essence, None),
    };
    if !is_token(kind) {
        return Err(MediaTypeError::InvalidToken);
    }
    if let Some(subtype) = subtype {
        if subtype.is_empty() {
            return Err(MediaTypeError::MissingSubtype);
        }
        if !is_token(subtype) {
            return Err(MediaTypeError::InvalidToken);
        }
    }

    for param in parts {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        match param.split_once('=') {
            Some((name, _)) if is_token(name.trim()) => {}
            _ => return Err(MediaTypeError::InvalidParameter),
        }
    }

    Ok(essence.to_ascii_lowercase())
}

/// RFC 7230 token characters.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
