//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM/SIGINT handlers once, at startup
//! - Forward every received signal to the shutdown coordinator
//!
//! # Design Decisions
//! - Registration failures surface as startup errors
//! - The coordinator fans the signal out to every waiter
//! - First signal wins; repeats are logged and ignored

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};

/// Subscribed termination signals, not yet being watched.
pub struct SignalWatcher {
    shutdown: Shutdown,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalWatcher {
    /// Register handlers for SIGINT and SIGTERM.
    #[cfg(unix)]
    pub fn install(shutdown: Shutdown) -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            shutdown,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install(shutdown: Shutdown) -> io::Result<Self> {
        Ok(Self { shutdown })
    }

    /// Watch for signals on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[cfg(unix)]
    async fn run(mut self) {
        loop {
            let reason = tokio::select! {
                received = self.interrupt.recv() => match received {
                    Some(()) => ShutdownReason::Interrupt,
                    None => break,
                },
                received = self.terminate.recv() => match received {
                    Some(()) => ShutdownReason::Terminate,
                    None => break,
                },
            };
            self.forward(reason);
        }
    }

    #[cfg(not(unix))]
    async fn run(self) {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            self.forward(ShutdownReason::Interrupt);
        }
    }

    fn forward(&self, reason: ShutdownReason) {
        if self.shutdown.trigger(reason) {
            tracing::info!(signal = %reason, "Shutdown signal received");
        } else {
            tracing::warn!(signal = %reason, "Shutdown already in progress, ignoring signal");
        }
    }
}
