//! Greetbot: a Slack Events API webhook receiver.

pub mod config;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::Config;
pub use events::Dispatcher;
pub use http::HttpServer;
pub use lifecycle::{LifecycleManager, Shutdown};
