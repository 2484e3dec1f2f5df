//! Configuration loading, validation, and hot-reload watching.

mod loader;
mod types;
mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use types::{Algorithm, Config, HealthCheckConfig, ServiceConfig};
pub use validation::validate_config;
