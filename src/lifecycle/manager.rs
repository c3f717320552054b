//! Server lifecycle orchestration.
//!
//! # Responsibilities
//! - Bind the listening socket before anything is served
//! - Run the accept loop and the shutdown sequence side by side
//! - Bound the drain by the grace period
//! - Report how serving and shutdown each ended
//!
//! # Design Decisions
//! - Fail fast: a bind error is fatal and nothing is served
//! - Both outcomes are logged together, once both are known
//! - Exceeding the grace period is reported, never fatal

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::config::Config;
use crate::events::Dispatcher;
use crate::http::server::{HttpServer, ServeError, ServeOutcome, ServerHandle};
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason, ShutdownSignal};
use crate::net::listener::Listener;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open HTTP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error(
        "grace period of {grace:?} exceeded with {connections} connection(s) \
         and {jobs} dispatch job(s) outstanding"
    )]
    GracePeriodExceeded {
        grace: Duration,
        connections: usize,
        jobs: usize,
    },
    #[error("shutdown task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How the server run ended.
#[derive(Debug)]
pub struct ShutdownReport {
    /// The signal that started shutdown.
    pub signal: Option<ShutdownSignal>,
    pub serve_error: Option<ServeError>,
    pub shutdown_error: Option<ShutdownError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.serve_error.is_none() && self.shutdown_error.is_none()
    }
}

/// Owns the listener and HTTP server from bind until both have stopped.
pub struct LifecycleManager {
    config: Arc<Config>,
    shutdown: Shutdown,
    server: HttpServer,
    listener: Listener,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl LifecycleManager {
    /// Bind the configured port.
    pub async fn bind(
        config: Arc<Config>,
        shutdown: Shutdown,
        dispatcher: Dispatcher,
    ) -> Result<Self, StartupError> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        let addr = config.bind_address();

        tracing::info!(address = %addr, "Binding to TCP socket");
        let listener = Listener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        let server = HttpServer::new(Arc::clone(&config), dispatcher);

        Ok(Self {
            config,
            shutdown,
            server,
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn server_handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Serve until shutdown, then drain within the grace period.
    pub async fn run(self) -> ShutdownReport {
        let Self {
            config,
            shutdown,
            server,
            listener,
            state,
        } = self;
        let handle = server.handle();
        let grace = config.server.shutdown_grace();

        let stop_task = tokio::spawn({
            let shutdown = shutdown.clone();
            let state = Arc::clone(&state);
            async move {
                let signal = shutdown.cancelled().await;
                tracing::info!(reason = %signal.reason, "Shutting HTTP server down gracefully");
                metrics::record_shutdown(signal.reason.as_str());
                state.send_replace(LifecycleState::ShuttingDown);

                let result = drain(&handle, grace).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Failed to gracefully shut down HTTP server");
                }
                result
            }
        });

        state.send_replace(LifecycleState::Serving);
        let serve_task = tokio::spawn(server.serve(listener, shutdown.clone()));

        let (listener, serve_error) = match serve_task.await {
            Ok(ServeOutcome { listener, result }) => (Some(listener), result.err()),
            Err(e) => {
                shutdown.trigger(ShutdownReason::ServeError);
                (None, Some(ServeError::from(e)))
            }
        };
        let shutdown_error = match stop_task.await {
            Ok(result) => result.err(),
            Err(e) => Some(ShutdownError::from(e)),
        };

        if let Some(mut listener) = listener {
            listener.close();
        }

        tracing::info!(
            serve_error = serve_error.as_ref().map(tracing::field::display),
            shutdown_error = shutdown_error.as_ref().map(tracing::field::display),
            "Server shut down"
        );
        state.send_replace(LifecycleState::Stopped);

        ShutdownReport {
            signal: shutdown.signal(),
            serve_error,
            shutdown_error,
        }
    }
}

/// Wait for the server to drain, giving up after `grace`.
///
/// Whatever is still running when the grace period ends is left alone.
pub async fn drain(handle: &ServerHandle, grace: Duration) -> Result<(), ShutdownError> {
    match tokio::time::timeout(grace, handle.drained()).await {
        Ok(()) => Ok(()),
        Err(_) => Err(ShutdownError::GracePeriodExceeded {
            grace,
            connections: handle.active_connections(),
            jobs: handle.pending_jobs(),
        }),
    }
}
