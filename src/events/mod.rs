//! Slack Events API handling.
//!
//! # Data Flow
//! ```text
//! Admitted JSON document
//!     → parser.rs (envelope: type, event_id, event_time, event)
//!     → url_verification: challenge echoed by the HTTP layer
//!     → otherwise: dispatch.rs (route on event.type)
//!         → app_mention: richtext.rs extracts the mention text
//!         → anything else: accepted silently
//! ```

pub mod dispatch;
pub mod parser;
pub mod richtext;

pub use dispatch::{DispatchOutcome, Dispatcher, Mention};
pub use parser::{Envelope, EnvelopeKind, Event, ParseError};
