//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags / environment variables
//!     → loader.rs (read, erase secrets from the environment)
//!     → optional TOML tuning file (timeouts, limits)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - Loading happens before the runtime starts so the environment can be
//!   mutated safely
//! - Validation separates syntactic (clap, serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, Args, ConfigError, EnvSource, ProcessEnv};
pub use schema::{Config, DeploymentMetadata, Environment, Secret, ServerTuning, SlackConfig};
