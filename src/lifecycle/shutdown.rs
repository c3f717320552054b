//! Shutdown coordination.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;

/// What started the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The accept loop failed.
    ServeError,
    /// Requested programmatically.
    Requested,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::Interrupt => "interrupt",
            ShutdownReason::Terminate => "terminate",
            ShutdownReason::ServeError => "serve_error",
            ShutdownReason::Requested => "requested",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one notification that begins shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSignal {
    pub reason: ShutdownReason,
    pub received_at: SystemTime,
}

/// Coordinator for graceful shutdown.
///
/// Fires at most once. Every clone observes the same signal, including
/// clones that start waiting after it has fired. The first trigger wins;
/// later ones are reported back to the caller and otherwise ignored.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Begin shutdown. Returns `true` if this call was the one that fired it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(ShutdownSignal {
                reason,
                received_at: SystemTime::now(),
            });
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The signal that fired, if any.
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.tx.borrow()
    }

    /// Wait for shutdown to begin.
    pub async fn cancelled(&self) -> ShutdownSignal {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(signal) = *rx.borrow_and_update() {
                return signal;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
