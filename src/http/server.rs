//! HTTP server setup and connection handling.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing)
//! - Accept TCP connections and drive HTTP/1.1 on each
//! - Enforce request head read and keep-alive idle timeouts per connection
//! - Stop accepting and drain connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, routing::any, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tower::ServiceExt;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::Config;
use crate::events::Dispatcher;
use crate::http::admission::AdmissionGate;
use crate::http::handlers;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::net::connection::{ActivityTracker, ConnectionActivity, ConnectionId, Expiry, WatchedIo};
use crate::net::listener::{classify_accept_error, AcceptErrorKind, Listener};
use crate::observability::metrics;

/// Pause after running out of file descriptors or memory.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub dispatcher: Dispatcher,
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("serve task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What the accept loop hands back when it stops.
pub struct ServeOutcome {
    pub listener: Listener,
    pub result: Result<(), ServeError>,
}

/// Observes a running server from outside the accept loop.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    connections: ActivityTracker,
    jobs: ActivityTracker,
    accepting: watch::Receiver<bool>,
}

impl ServerHandle {
    pub fn active_connections(&self) -> usize {
        self.connections.active_count()
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.active_count()
    }

    /// Resolves once the listener is closed.
    pub async fn stopped_accepting(&self) {
        let mut accepting = self.accepting.clone();
        // A dropped sender means the accept loop is gone as well.
        let _ = accepting.wait_for(|accepting| !*accepting).await;
    }

    /// Wait until nothing is left: no listener, no connections, no jobs.
    ///
    /// Connections are drained before jobs since only requests spawn jobs.
    pub async fn drained(&self) {
        self.stopped_accepting().await;
        self.connections.wait_idle().await;
        self.jobs.wait_idle().await;
    }
}

/// HTTP server for the webhook endpoint.
pub struct HttpServer {
    router: Router,
    config: Arc<Config>,
    connections: ActivityTracker,
    jobs: ActivityTracker,
    accepting: watch::Sender<bool>,
}

impl HttpServer {
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        let jobs = dispatcher.jobs().clone();
        let state = AppState {
            gate: Arc::new(AdmissionGate::from_config(&config)),
            dispatcher,
        };

        let (accepting, _) = watch::channel(true);
        Self {
            router: Self::build_router(state),
            config,
            connections: ActivityTracker::new(),
            jobs,
            accepting,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/_ruok", any(handlers::ruok))
            .route("/slack/event", any(handlers::slack_event))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            connections: self.connections.clone(),
            jobs: self.jobs.clone(),
            accepting: self.accepting.subscribe(),
        }
    }

    /// Accept connections until shutdown begins or accepting fails for good.
    ///
    /// Connections already accepted keep running after this returns; they
    /// finish their current request and close on their own.
    pub async fn serve(self, mut listener: Listener, shutdown: Shutdown) -> ServeOutcome {
        tracing::info!(address = %listener.local_addr(), "HTTP server starting");

        let result = loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer, shutdown.clone()),
                Err(e) => match classify_accept_error(&e) {
                    AcceptErrorKind::Connection => {
                        tracing::debug!(error = %e, "Accept failed, continuing");
                    }
                    AcceptErrorKind::Resource => {
                        tracing::warn!(error = %e, "Accept failed, backing off");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    AcceptErrorKind::Fatal => {
                        tracing::error!(error = %e, "HTTP server failed");
                        shutdown.trigger(ShutdownReason::ServeError);
                        break Err(ServeError::Accept(e));
                    }
                },
            }
        };

        listener.close();
        self.accepting.send_replace(false);
        tracing::info!("HTTP server stopped accepting connections");

        ServeOutcome { listener, result }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, shutdown: Shutdown) {
        let guard = self.connections.track();
        let id = ConnectionId::new();
        let router = self.router.clone();
        let read_timeout = self.config.server.read_timeout();
        let idle_timeout = self.config.server.idle_timeout();

        tokio::spawn(
            async move {
                let _guard = guard;
                metrics::connection_opened();
                serve_connection(stream, router, read_timeout, idle_timeout, shutdown).await;
                metrics::connection_closed();
            }
            .instrument(tracing::debug_span!("connection", id = %id, peer = %peer)),
        );
    }
}

async fn serve_connection(
    stream: TcpStream,
    router: Router,
    read_timeout: Duration,
    idle_timeout: Duration,
    shutdown: Shutdown,
) {
    let activity = ConnectionActivity::new();
    let service = {
        let activity = Arc::clone(&activity);
        hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
            let in_flight = activity.begin();
            let router = router.clone();
            async move {
                let response = router.oneshot(request.map(Body::new)).await;
                drop(in_flight);
                response
            }
        })
    };

    // Head and idle deadlines are enforced by `activity` below. hyper's own
    // header timer also runs between keep-alive requests, so it stays off.
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(None)
        .keep_alive(true);
    let io = WatchedIo::new(stream, Arc::clone(&activity));
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Connection closed with error");
                }
                break;
            }
            _ = shutdown.cancelled(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
            expiry = activity.expired(read_timeout, idle_timeout), if !draining => match expiry {
                Expiry::Idle => {
                    tracing::debug!(timeout = ?idle_timeout, "Closing idle connection");
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                Expiry::HeadTimeout => {
                    tracing::debug!(timeout = ?read_timeout, "Timed out reading request head");
                    break;
                }
            },
        }
    }
}
