//! Error types for the qqbot framework.

use thiserror::Error;

use crate::handler::HandlerKind;

/// Errors raised while building the handler registry.
///
/// These are fatal at startup: the bot refuses to run with a broken registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two handlers of the same kind share a name.
    #[error("duplicate {kind} handler name: '{name}'")]
    DuplicateName {
        /// The kind both handlers belong to.
        kind: HandlerKind,
        /// The colliding name.
        name: String,
    },

    /// A handler was registered without a name.
    #[error("{kind} handler registered with an empty name")]
    EmptyName {
        /// The kind of the nameless handler.
        kind: HandlerKind,
    },
}

/// A reply to a disambiguation prompt that does not pick a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The reply text is not a number.
    #[error("'{input}' 不是有效的序号")]
    NotANumber {
        /// The trimmed reply text.
        input: String,
    },

    /// The number is outside `1..=max`.
    #[error("序号 {index} 超出范围 (1-{max})")]
    OutOfRange {
        /// The number that was sent.
        index: usize,
        /// Number of candidates offered.
        max: usize,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
