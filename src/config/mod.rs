//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and TOML loading
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup validation

mod defaults;
mod types;
mod validation;

pub use types::{
    Config, ConfigError, LoggingConfig, NetworkConfig, NickServConfig, SecurityConfig,
    ServerConfig,
};
pub use validation::{ValidationError, validate};
