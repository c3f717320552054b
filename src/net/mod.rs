//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, error classification)
//!     → connection.rs (lifecycle tracking, idle detection)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Accepted → Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - One task per connection, no artificial concurrency cap
//! - Each connection tracked for graceful shutdown
//! - The listener is closed exactly once

pub mod connection;
pub mod listener;
