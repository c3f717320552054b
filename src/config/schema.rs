//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the receiver.
//! The tunable server section derives Serde traits so it can be read from a
//! TOML file; everything else is sourced from the environment.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Root configuration for the webhook receiver.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to bind on all interfaces.
    pub port: u16,

    /// Default log verbosity (overridden by `RUST_LOG` when set).
    pub log_level: LevelFilter,

    /// Current deployment environment.
    pub env: Environment,

    /// Dyno metadata, informational only.
    pub deployment: DeploymentMetadata,

    /// Slack application settings and secrets.
    pub slack: SlackConfig,

    /// Timeouts and limits applied by the HTTP server.
    pub server: ServerTuning,

    /// Prometheus exporter bind address. Metrics are disabled when unset.
    pub metrics_address: Option<SocketAddr>,
}

impl Config {
    /// Socket address the webhook listener binds to.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    /// Parse an environment name. Unknown names fall back to development.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            "testing" => Environment::Testing,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Whether logs should be emitted as JSON lines.
    pub fn is_deployed(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heroku dyno metadata.
#[derive(Debug, Clone, Default)]
pub struct DeploymentMetadata {
    /// `HEROKU_APP_ID`
    pub app_id: String,
    /// `HEROKU_APP_NAME`
    pub app_name: String,
    /// `HEROKU_DYNO_ID`
    pub dyno_id: String,
    /// `HEROKU_SLUG_COMMIT`
    pub commit: String,
}

/// Slack application configuration.
#[derive(Debug, Clone, Default)]
pub struct SlackConfig {
    pub app_id: String,
    /// Workspace the app is deployed to.
    pub team_id: String,
    pub client_id: String,
    pub client_secret: Secret,
    /// HMAC signing secret used to authenticate inbound requests.
    pub request_secret: Secret,
    /// Legacy verification token carried in event bodies.
    pub request_token: Secret,
    /// Bot token for outbound API calls.
    pub bot_access_token: Secret,
}

/// A string that never shows up in `Debug` or `Display` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Optional TOML file layout.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TuningFile {
    pub server: ServerTuning,
}

/// Timeouts and limits for the HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerTuning {
    /// Time allowed to read a request head and body, in seconds.
    pub read_timeout_secs: u64,

    /// Keep-alive idle timeout between requests, in seconds.
    pub idle_timeout_secs: u64,

    /// Grace period for draining in-flight work on shutdown, in seconds.
    pub shutdown_grace_secs: u64,

    /// Body read ceiling in bytes. Anything past it is dropped.
    pub max_body_bytes: usize,

    /// Maximum accepted age (or clock skew) of a signed request, in seconds.
    pub replay_window_secs: u64,
}

impl ServerTuning {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn replay_window(&self) -> Duration {
        Duration::from_secs(self.replay_window_secs)
    }
}

impl Default for ServerTuning {
    fn default() -> Self {
        Self {
            read_timeout_secs: 20,
            idle_timeout_secs: 60,
            shutdown_grace_secs: 25,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            replay_window_secs: 5 * 60,
        }
    }
}
