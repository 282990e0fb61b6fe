//! Configuration module for the Bottle runtime.
//!
//! Configuration is layered with figment: built-in defaults, then a
//! `bottle.toml` / `bottle.yaml` file, then `BOTTLE_*` environment variables.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BottleConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
