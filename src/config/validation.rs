//! Configuration validation.
//!
//! Returns all validation errors, not just the first, so a misconfigured
//! deployment can be fixed in one pass.

use thiserror::Error;

use crate::config::schema::Config;

/// Upper bound for the body read ceiling.
const MAX_ALLOWED_BODY_BYTES: usize = 64 * 1024 * 1024;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("SLACK_REQUEST_SECRET must be set")]
    MissingSigningSecret,
    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },
    #[error("max_body_bytes exceeds maximum allowed ({max} bytes)")]
    BodyLimitTooLarge { max: usize },
}

/// Validate a fully-loaded configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.slack.request_secret.is_empty() {
        errors.push(ValidationError::MissingSigningSecret);
    }

    let server = &config.server;
    let nonzero = [
        ("read_timeout_secs", server.read_timeout_secs),
        ("idle_timeout_secs", server.idle_timeout_secs),
        ("shutdown_grace_secs", server.shutdown_grace_secs),
        ("replay_window_secs", server.replay_window_secs),
        ("max_body_bytes", server.max_body_bytes as u64),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if server.max_body_bytes > MAX_ALLOWED_BODY_BYTES {
        errors.push(ValidationError::BodyLimitTooLarge {
            max: MAX_ALLOWED_BODY_BYTES,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
