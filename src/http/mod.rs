//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, HTTP/1.1, timeouts, drain)
//!     → request.rs (request ID)
//!     → handlers.rs (/_ruok, /slack/event)
//!         → admission.rs (method, content type, body, JSON, signature)
//!         → events::Event::parse, then dispatch in the background
//!     → response.rs (status and hint headers)
//! ```

pub mod admission;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use admission::{AdmissionGate, AdmittedRequest, Rejection};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServeError, ServerHandle};
