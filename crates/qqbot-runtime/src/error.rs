//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use qqbot_core::{ArchiveError, TransportError};
use qqbot_framework::RegistryError;

/// Errors that can occur while starting or running the bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The handler registry could not be built.
    #[error("Handler registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The gateway or the webhook listener failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The message archive could not be opened.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The runtime was started twice.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
