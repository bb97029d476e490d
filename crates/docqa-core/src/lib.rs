//! Configuration loading, secret handling, and pipeline bootstrap.

pub mod bootstrap;
pub mod config;
pub mod secret;

pub use bootstrap::App;
pub use config::{Config, ConfigError};
pub use secret::Secret;
