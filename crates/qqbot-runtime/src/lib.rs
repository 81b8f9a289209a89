//! QQBot Runtime - Orchestration layer for the QQ bot.
//!
//! This crate provides:
//! - Layered configuration (`QQBotConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - The concrete bot (`QQBot`) talking to the gateway
//! - Event processing: archival, then dispatch (`EventProcessor`)
//! - Lifecycle orchestration (`QQBotRuntime`)
//!
//! ```ignore
//! use qqbot_runtime::QQBotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = QQBotRuntime::new();
//!     runtime.register_plugins(&[ECHO])?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod processor;
pub mod runtime;

#[cfg(test)]
mod testing;

// Re-exports
pub use bot::QQBot;
pub use config::{ConfigError, ConfigLoader, ConfigResult, QQBotConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use processor::EventProcessor;
pub use runtime::{QQBotRuntime, RunningBot, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
