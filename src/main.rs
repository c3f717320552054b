//! Greetbot
//!
//! Receives Slack Events API deliveries over HTTP, authenticates them, and
//! reacts to app mentions.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────┐
//!                    │                   GREETBOT                    │
//!                    │                                               │
//!   Slack delivery   │  ┌─────────┐   ┌─────────┐   ┌────────────┐   │
//!   ─────────────────┼─▶│   net   │──▶│  http   │──▶│ admission  │   │
//!                    │  │listener │   │ server  │   │   gate     │   │
//!                    │  └─────────┘   └─────────┘   └─────┬──────┘   │
//!                    │                                    ▼          │
//!   200 / 4xx        │                ┌─────────┐   ┌────────────┐   │
//!   ◀────────────────┼────────────────│response │◀──│   events   │   │
//!                    │                └─────────┘   │  parser    │   │
//!                    │                              └─────┬──────┘   │
//!                    │                                    ▼          │
//!                    │                              ┌────────────┐   │
//!                    │                              │ dispatcher │   │
//!                    │                              │(background)│   │
//!                    │                              └────────────┘   │
//!                    │  config · observability · lifecycle/signals   │
//!                    └───────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use greetbot::config::{load_config, Args, Config, ProcessEnv};
use greetbot::events::Dispatcher;
use greetbot::lifecycle::{LifecycleManager, Shutdown, ShutdownReport, SignalWatcher, StartupError};
use greetbot::observability::{logging, metrics};

fn main() -> ExitCode {
    let args = Args::parse();

    // Single-threaded until here: secrets are removed from the environment
    // before any runtime thread exists.
    let config = match load_config(&args, &mut ProcessEnv) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("greetbot: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("greetbot: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(report) => {
            if let Some(signal) = report.signal {
                tracing::info!(reason = %signal.reason, clean = report.is_clean(), "Exiting");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start HTTP server");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<Config>) -> Result<ShutdownReport, StartupError> {
    tracing::info!(
        env = %config.env,
        app_id = %config.deployment.app_id,
        app_name = %config.deployment.app_name,
        dyno_id = %config.deployment.dyno_id,
        commit = %config.deployment.commit,
        slack_app_id = %config.slack.app_id,
        slack_team_id = %config.slack.team_id,
        slack_client_id = %config.slack.client_id,
        port = config.port,
        log_level = %config.log_level,
        "greetbot v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(addr) = config.metrics_address {
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    let signals = SignalWatcher::install(shutdown.clone())
        .map_err(StartupError::Signals)?
        .spawn();

    let manager = LifecycleManager::bind(config, shutdown, Dispatcher::new()).await?;
    tracing::info!(address = %manager.local_addr(), "Listening for connections");

    let report = manager.run().await;
    signals.abort();
    Ok(report)
}
