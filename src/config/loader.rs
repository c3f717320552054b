//! Configuration loading from the command line, environment and disk.
//!
//! Secrets are read from the environment exactly once and erased from it
//! immediately afterwards, so they never leak to child processes.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::config::schema::{
    Config, DeploymentMetadata, Environment, Secret, ServerTuning, SlackConfig, TuningFile,
};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables holding secrets. Removed after they are read.
pub const SECRET_VARS: [&str; 3] = [
    "SLACK_CLIENT_SECRET",
    "SLACK_REQUEST_SECRET",
    "SLACK_BOT_ACCESS_TOKEN",
];

/// CLI arguments for the webhook receiver.
#[derive(Parser, Debug, Clone)]
#[command(name = "greetbot")]
#[command(about = "Slack Events API webhook receiver")]
#[command(version)]
pub struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,
    /// Log level (trace, debug, info, warn, error, off).
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
    /// Deployment environment name.
    #[arg(long, default_value = "development", env = "ENV")]
    pub env: String,
    /// Optional TOML file with server timeouts and limits.
    #[arg(long, env = "GREETBOT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Socket address for the Prometheus metrics endpoint.
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse tuning file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read access to environment variables, plus removal.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
    fn remove(&mut self, key: &str);
}

/// The real process environment.
///
/// Removing variables is only sound while the process is single threaded,
/// so configuration must be loaded before the async runtime is built.
#[derive(Debug, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn remove(&mut self, key: &str) {
        std::env::remove_var(key);
    }
}

/// Build the runtime configuration from CLI arguments and the environment.
pub fn load_config(args: &Args, env: &mut impl EnvSource) -> Result<Config, ConfigError> {
    // Secrets are scrubbed first so a failed load still leaves nothing behind.
    let client_secret = take_secret(env, "SLACK_CLIENT_SECRET");
    let request_secret = take_secret(env, "SLACK_REQUEST_SECRET");
    let bot_access_token = take_secret(env, "SLACK_BOT_ACCESS_TOKEN");

    let log_level = LevelFilter::from_str(&args.log_level).map_err(|e| {
        ConfigError::InvalidValue {
            name: "LOG_LEVEL",
            message: e.to_string(),
        }
    })?;

    let server = match &args.config {
        Some(path) => load_tuning(path)?,
        None => ServerTuning::default(),
    };

    let var = |key: &str| env.var(key).unwrap_or_default();

    let config = Config {
        port: args.port,
        log_level,
        env: Environment::from_name(&args.env),
        deployment: DeploymentMetadata {
            app_id: var("HEROKU_APP_ID"),
            app_name: var("HEROKU_APP_NAME"),
            dyno_id: var("HEROKU_DYNO_ID"),
            commit: var("HEROKU_SLUG_COMMIT"),
        },
        slack: SlackConfig {
            app_id: var("SLACK_APP_ID"),
            team_id: var("SLACK_TEAM_ID"),
            client_id: var("SLACK_CLIENT_ID"),
            client_secret,
            request_secret,
            request_token: Secret::new(var("SLACK_REQUEST_TOKEN")),
            bot_access_token,
        },
        server,
        metrics_address: args.metrics_addr,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load server tuning from a TOML file.
pub fn load_tuning(path: &Path) -> Result<ServerTuning, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: TuningFile = toml::from_str(&content)?;
    Ok(file.server)
}

fn take_secret(env: &mut impl EnvSource, key: &str) -> Secret {
    let value = env.var(key).unwrap_or_default();
    env.remove(key);
    Secret::new(value)
}
