//! Gateway event classification and the inbound event seam.
//!
//! The webhook server only knows bytes; it hands every body to an
//! [`EventSink`]. The sink classifies it with [`PostType::of`] and decides
//! what to do.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EnvelopeError, EnvelopeResult, TransportResult};

/// The `post_type` of a gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostType {
    /// A chat message.
    Message,
    /// A meta event, carrying its `meta_event_type` (`heartbeat`, `lifecycle`).
    MetaEvent(String),
    /// Anything else (`notice`, `request`, `message_sent`, ...).
    Other(String),
}

impl PostType {
    /// Reads the `post_type` of a raw event.
    pub fn of(raw: &Value) -> EnvelopeResult<Self> {
        let post_type = raw
            .get("post_type")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvelopeError::malformed("missing required field 'post_type'"))?;

        Ok(match post_type {
            "message" => Self::Message,
            "meta_event" => Self::MetaEvent(
                raw.get("meta_event_type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            other => Self::Other(other.to_string()),
        })
    }

    /// Returns `true` for heartbeat meta events.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::MetaEvent(kind) if kind == "heartbeat")
    }
}

/// Receives raw event bodies from a transport.
///
/// Only a [`TransportError`](crate::TransportError) is reported back; every
/// per-message problem is handled inside the sink.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Handles one event body.
    async fn on_event(&self, body: &[u8]) -> TransportResult<()>;
}

/// Shared event sink.
pub type BoxedEventSink = Arc<dyn EventSink>;
