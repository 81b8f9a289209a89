//! Configuration module for the qqbot runtime.
//!
//! Layered loading (defaults, files, environment) through figment, plus
//! validation of the merged result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ArchiveBackend, ArchiveConfig, DispatchConfig, GatewayConfig, LogFormat, LogLevel, LogOutput,
    LogRotation, LoggingConfig, QQBotConfig, RetryConfig, ServerConfig, SpanEventConfig,
};
pub use validation::validate_config;
