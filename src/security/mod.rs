//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming webhook request:
//!     → media_type.rs (Content-Type negotiation)
//!     → limits.rs (bounded body read)
//!     → signature.rs (HMAC over timestamp + raw body)
//!     → Pass to event parsing
//! ```
//!
//! # Design Decisions
//! - Cheap checks first; the body is never read for a bad method or type
//! - Fail closed: reject on any authenticity problem
//! - No trust in client input

pub mod limits;
pub mod media_type;
pub mod signature;
