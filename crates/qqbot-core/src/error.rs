//! Error types shared by every qqbot crate.
//!
//! Framework-level errors (registry, selection) live in `qqbot-framework`,
//! configuration errors in `qqbot-runtime`.

use thiserror::Error;

// =============================================================================
// Envelope Errors
// =============================================================================

/// Errors raised while turning a gateway payload into an [`Envelope`].
///
/// [`Envelope`]: crate::Envelope
#[derive(Debug, Clone, Error)]
pub enum EnvelopeError {
    /// A required field is missing or has the wrong shape.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// What was wrong.
        reason: String,
    },

    /// A segment carried a tag this crate does not know.
    #[error("unknown segment type: {tag}")]
    UnknownSegmentType {
        /// The unrecognized `type` value.
        tag: String,
    },

    /// Archivable bytes could not be produced or read back.
    #[error("envelope serialization failed: {0}")]
    Serialization(String),
}

impl EnvelopeError {
    /// Creates a malformed-payload error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Creates an unknown-segment error.
    pub fn unknown_segment(tag: impl Into<String>) -> Self {
        Self::UnknownSegmentType { tag: tag.into() }
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Archive Errors
// =============================================================================

/// Errors raised by a [`MessageArchive`].
///
/// [`MessageArchive`]: crate::MessageArchive
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// No record matched the id and filters.
    #[error("message {message_id} not found in archive")]
    NotFound {
        /// The requested message id.
        message_id: i64,
    },

    /// The stored bytes could not be decoded.
    #[error("archived envelope is unreadable: {0}")]
    Serialization(String),

    /// The backing store failed.
    #[error("archive storage error: {0}")]
    Storage(String),
}

impl ArchiveError {
    /// Creates a not-found error for `message_id`.
    pub fn not_found(message_id: i64) -> Self {
        Self::NotFound { message_id }
    }

    /// Returns `true` for [`ArchiveError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<EnvelopeError> for ArchiveError {
    fn from(err: EnvelopeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors talking to the chat gateway.
///
/// The dispatcher never swallows these: they mean the bot itself may be
/// unreachable.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request never got a response.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The gateway answered but did not report `status: ok`.
    #[error("gateway action '{action}' failed (status={status}, retcode={retcode}): {message}")]
    Api {
        /// The action that was called.
        action: String,
        /// Reported status string.
        status: String,
        /// Reported return code.
        retcode: i64,
        /// Reported message, if any.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// The capability is not compiled in or not configured.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport that is missing.
        transport: &'static str,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Result Aliases
// =============================================================================

/// Result type for envelope parsing.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
