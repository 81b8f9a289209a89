//! The inbound message envelope.
//!
//! An [`Envelope`] is built once from the gateway's `post_type = "message"`
//! payload and is read-only afterwards. It is archived by message id and may
//! be fetched back later, so [`Envelope::to_archivable`] and
//! [`Envelope::from_archivable`] round-trip exactly.
//!
//! # Gateway payload
//!
//! ```json
//! {
//!   "time": 1700000000,
//!   "self_id": 10000,
//!   "post_type": "message",
//!   "message_type": "group",
//!   "message_id": 200,
//!   "message_seq": 200,
//!   "group_id": 123456,
//!   "user_id": 20000,
//!   "sender": {"user_id": 20000, "nickname": "Alice", "card": ""},
//!   "message": [{"type": "reply", "data": {"id": "100"}},
//!               {"type": "text", "data": {"text": "echo"}}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::message::Message;
use crate::segment::{Segment, parse_segment};

// ============================================================================
// Chat Scope
// ============================================================================

/// Where a message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatScope {
    /// One-to-one conversation with the sender.
    Direct,
    /// Group conversation.
    Group {
        /// The group number.
        group_id: i64,
    },
}

impl ChatScope {
    /// Returns the group id for group scopes.
    pub fn group_id(&self) -> Option<i64> {
        match self {
            Self::Direct => None,
            Self::Group { group_id } => Some(*group_id),
        }
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Sender information attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender QQ number.
    pub user_id: i64,
    /// Nickname.
    #[serde(default)]
    pub nickname: String,
    /// Group card (group nickname), if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
}

impl Sender {
    /// Returns the card if set, otherwise the nickname.
    pub fn display_name(&self) -> &str {
        self.card.as_deref().unwrap_or(&self.nickname)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One parsed inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The bot account that received the message.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Unique message id.
    pub message_id: i64,
    /// Gateway sequence number.
    pub sequence: i64,
    /// Direct or group.
    pub scope: ChatScope,
    /// Who sent it.
    pub sender: Sender,
    /// Parsed content.
    pub message: Message,
}

impl Envelope {
    /// Parses a gateway message event.
    ///
    /// Required fields are `self_id`, `time`, `message_type`, `message_id`,
    /// `message_seq` and `sender`; group messages also need `group_id`.
    /// Segments with unknown or malformed data are skipped with a warning.
    pub fn parse(raw: &Value) -> EnvelopeResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| EnvelopeError::malformed("payload is not an object"))?;

        let self_id = required_i64(object, "self_id")?;
        let time = required_i64(object, "time")?;
        let message_id = required_i64(object, "message_id")?;
        let sequence = required_i64(object, "message_seq")?;

        let scope = match required_str(object, "message_type")? {
            "private" => ChatScope::Direct,
            "group" => ChatScope::Group {
                group_id: required_i64(object, "group_id")?,
            },
            other => {
                return Err(EnvelopeError::malformed(format!(
                    "unsupported message_type '{other}'"
                )));
            }
        };

        let sender = parse_sender(object)?;
        let message = parse_message(object.get("message"), message_id)?;

        Ok(Self {
            self_id,
            time,
            message_id,
            sequence,
            scope,
            sender,
            message,
        })
    }

    /// Serializes the envelope for the archive.
    pub fn to_archivable(&self) -> EnvelopeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restores an envelope produced by [`Envelope::to_archivable`].
    pub fn from_archivable(bytes: &[u8]) -> EnvelopeResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Sender QQ number.
    pub fn sender_id(&self) -> i64 {
        self.sender.user_id
    }

    /// Group number for group messages.
    pub fn group_id(&self) -> Option<i64> {
        self.scope.group_id()
    }

    /// Returns `true` for one-to-one messages.
    pub fn is_direct(&self) -> bool {
        matches!(self.scope, ChatScope::Direct)
    }

    /// The message id this envelope replies to, if any.
    pub fn reply_target(&self) -> Option<i64> {
        self.message.reply_target()
    }

    /// Concatenated text content.
    pub fn plain_text(&self) -> String {
        self.message.plain_text()
    }

    /// Returns `true` if the message @-mentions the receiving bot.
    pub fn mentions_self(&self) -> bool {
        self.message.mentions(self.self_id)
    }

    /// The segments of the message.
    pub fn segments(&self) -> &[Segment] {
        self.message.segments()
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn required_i64(object: &Map<String, Value>, field: &str) -> EnvelopeResult<i64> {
    match object.get(field) {
        Some(value) => value.as_i64().ok_or_else(|| {
            EnvelopeError::malformed(format!("field '{field}' must be an integer"))
        }),
        None => Err(EnvelopeError::malformed(format!(
            "missing required field '{field}'"
        ))),
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> EnvelopeResult<&'a str> {
    match object.get(field) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| EnvelopeError::malformed(format!("field '{field}' must be a string"))),
        None => Err(EnvelopeError::malformed(format!(
            "missing required field '{field}'"
        ))),
    }
}

fn parse_sender(object: &Map<String, Value>) -> EnvelopeResult<Sender> {
    let sender = object
        .get("sender")
        .ok_or_else(|| EnvelopeError::malformed("missing required field 'sender'"))?
        .as_object()
        .ok_or_else(|| EnvelopeError::malformed("field 'sender' must be an object"))?;

    // Some gateways only put user_id at the top level.
    let user_id = required_i64(sender, "user_id").or_else(|_| required_i64(object, "user_id"))?;
    let nickname = sender
        .get("nickname")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let card = sender
        .get("card")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok(Sender {
        user_id,
        nickname,
        card,
    })
}

fn parse_message(raw: Option<&Value>, message_id: i64) -> EnvelopeResult<Message> {
    let items = match raw {
        None | Some(Value::Null) => return Ok(Message::new()),
        Some(Value::String(text)) => return Ok(Message::from_text(text.as_str())),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(EnvelopeError::malformed(
                "field 'message' must be an array or a string",
            ));
        }
    };

    let mut segments = Vec::with_capacity(items.len());
    let mut has_reply = false;
    for item in items {
        match parse_segment(item) {
            Ok(segment) if segment.is_reply() && has_reply => {
                warn!(message_id, "Dropping extra reply marker");
            }
            Ok(segment) => {
                has_reply |= segment.is_reply();
                segments.push(segment);
            }
            Err(e) => {
                warn!(message_id, error = %e, "Skipping segment");
            }
        }
    }

    Ok(Message::from_segments(segments))
}
