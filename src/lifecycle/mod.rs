//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     Bind socket → Serving
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown.rs (first signal wins)
//!
//! Shutdown (manager.rs):
//!     Stop accepting → Drain connections and dispatch jobs → Stopped
//! ```
//!
//! # Design Decisions
//! - Config is loaded and validated before the runtime starts
//! - Shutdown has a deadline; work still running after it is abandoned

pub mod manager;
pub mod shutdown;
pub mod signals;

pub use manager::{LifecycleManager, LifecycleState, ShutdownError, ShutdownReport, StartupError};
pub use shutdown::{Shutdown, ShutdownReason, ShutdownSignal};
pub use signals::SignalWatcher;
