//! Message segment types.
//!
//! A segment is one typed unit of content inside a message: plain text, an
//! image, a mention, a reply marker, and so on. Segments travel on the wire
//! as `{"type": "...", "data": {...}}` objects.
//!
//! # Parsing
//!
//! Inbound segments go through [`parse_segment`], which matches the tag
//! case-insensitively, accepts a few legacy field names (`target` for `at`,
//! `face_id` for `face`) and reports unknown tags as
//! [`EnvelopeError::UnknownSegmentType`] so the caller can skip them.
//!
//! # Example
//!
//! ```rust,ignore
//! use qqbot_core::Segment;
//!
//! let text = Segment::text("Hello, ");
//! let at = Segment::at(10001000);
//! let reply = Segment::reply(100);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnvelopeError, EnvelopeResult};

// ============================================================================
// Segment Enum
// ============================================================================

/// A message segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text content.
    Text(TextData),
    /// Image.
    Image(ImageData),
    /// QQ emoji/face.
    Face(FaceData),
    /// @mention someone.
    At(AtData),
    /// Uploaded file.
    File(FileData),
    /// Voice recording.
    #[serde(rename = "record", alias = "voice")]
    Voice(VoiceData),
    /// Structured JSON card.
    Json(JsonData),
    /// Reply marker pointing at an earlier message.
    Reply(ReplyData),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Text(data) => write!(f, "{}", data.text),
            Segment::Image(data) => write!(f, "[图片:{}]", data.label()),
            Segment::Face(data) => write!(f, "[表情:{}]", data.id),
            Segment::At(data) => {
                if data.qq == "all" {
                    write!(f, "@全体成员")
                } else {
                    write!(f, "@{}", data.qq)
                }
            }
            Segment::File(data) => write!(f, "[文件:{}]", data.label()),
            Segment::Voice(data) => write!(f, "[语音:{}]", data.file),
            Segment::Json(_) => write!(f, "[JSON消息]"),
            Segment::Reply(data) => write!(f, "[回复:{}]", data.id),
        }
    }
}

impl Segment {
    // --------------------------------
    // Builders
    // --------------------------------

    /// Creates a plain text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(TextData { text: text.into() })
    }

    /// Creates an image segment from a file path or URL.
    pub fn image(file: impl Into<String>) -> Self {
        Segment::Image(ImageData {
            file: file.into(),
            ..Default::default()
        })
    }

    /// Creates a QQ face segment.
    pub fn face(id: i32) -> Self {
        Segment::Face(FaceData { id: id.to_string() })
    }

    /// Creates an @mention segment.
    pub fn at(qq: i64) -> Self {
        Segment::At(AtData { qq: qq.to_string() })
    }

    /// Creates an @all segment.
    pub fn at_all() -> Self {
        Segment::At(AtData {
            qq: "all".to_string(),
        })
    }

    /// Creates a voice segment.
    pub fn voice(file: impl Into<String>) -> Self {
        Segment::Voice(VoiceData {
            file: file.into(),
            ..Default::default()
        })
    }

    /// Creates a JSON card segment.
    pub fn json(data: impl Into<String>) -> Self {
        Segment::Json(JsonData { data: data.into() })
    }

    /// Creates a reply marker for `message_id`.
    pub fn reply(message_id: i64) -> Self {
        Segment::Reply(ReplyData { id: message_id })
    }

    // --------------------------------
    // Accessors
    // --------------------------------

    /// Returns the wire tag of this segment.
    pub fn segment_type(&self) -> &'static str {
        match self {
            Segment::Text(_) => "text",
            Segment::Image(_) => "image",
            Segment::Face(_) => "face",
            Segment::At(_) => "at",
            Segment::File(_) => "file",
            Segment::Voice(_) => "record",
            Segment::Json(_) => "json",
            Segment::Reply(_) => "reply",
        }
    }

    /// Returns the text if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(data) => Some(&data.text),
            _ => None,
        }
    }

    /// Returns the target message id if this is a reply marker.
    pub fn reply_target(&self) -> Option<i64> {
        match self {
            Segment::Reply(data) => Some(data.id),
            _ => None,
        }
    }

    /// Returns `true` if this segment mentions `user_id`.
    pub fn is_mention_of(&self, user_id: i64) -> bool {
        match self {
            Segment::At(data) => data.qq.parse::<i64>().is_ok_and(|qq| qq == user_id),
            _ => false,
        }
    }

    /// Returns `true` if this is a reply marker.
    pub fn is_reply(&self) -> bool {
        matches!(self, Segment::Reply(_))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses one raw gateway segment.
///
/// Fails with [`EnvelopeError::UnknownSegmentType`] for unrecognized tags and
/// with [`EnvelopeError::MalformedPayload`] when the tag is known but its
/// data does not fit.
pub fn parse_segment(raw: &Value) -> EnvelopeResult<Segment> {
    let object = raw
        .as_object()
        .ok_or_else(|| EnvelopeError::malformed("segment is not an object"))?;
    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EnvelopeError::malformed("segment has no type"))?;
    let data = object
        .get("data")
        .filter(|d| !d.is_null())
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let parsed = match tag.to_ascii_lowercase().as_str() {
        "text" => serde_json::from_value(data).map(Segment::Text),
        "image" => serde_json::from_value(data).map(Segment::Image),
        "face" => serde_json::from_value(data).map(Segment::Face),
        "at" => serde_json::from_value(data).map(Segment::At),
        "file" => serde_json::from_value(data).map(Segment::File),
        "record" | "voice" => serde_json::from_value(data).map(Segment::Voice),
        "json" => serde_json::from_value(data).map(Segment::Json),
        "reply" => serde_json::from_value(data).map(Segment::Reply),
        _ => return Err(EnvelopeError::unknown_segment(tag)),
    };

    parsed.map_err(|e| EnvelopeError::malformed(format!("invalid {tag} segment: {e}")))
}

// ============================================================================
// Segment Data Types
// ============================================================================

/// Text segment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextData {
    /// The text content.
    pub text: String,
}

/// Image segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageData {
    /// File name, path or URL.
    #[serde(default)]
    pub file: String,
    /// Download URL (receive only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de::lenient_u64"
    )]
    pub file_size: Option<u64>,
}

impl ImageData {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file)
    }
}

/// Face segment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceData {
    /// Face ID.
    #[serde(alias = "face_id", deserialize_with = "de::string_or_number")]
    pub id: String,
}

/// @mention segment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtData {
    /// QQ number, or `"all"`.
    #[serde(alias = "target", deserialize_with = "de::string_or_number")]
    pub qq: String,
}

/// File segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileData {
    /// File name or path as reported by the gateway.
    #[serde(default)]
    pub file: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Gateway-side file id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Local path on the gateway host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Size in bytes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de::lenient_u64"
    )]
    pub file_size: Option<u64>,
}

impl FileData {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file)
    }
}

/// Voice segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceData {
    /// File name, path or URL.
    #[serde(default, alias = "file_name")]
    pub file: String,
    /// Download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local path on the gateway host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Size in bytes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de::lenient_u64"
    )]
    pub file_size: Option<u64>,
}

/// JSON card segment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonData {
    /// The JSON document, as a string.
    #[serde(alias = "json")]
    pub data: String,
}

/// Reply segment data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyData {
    /// Id of the message being replied to.
    #[serde(with = "de::id_string")]
    pub id: i64,
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Gateways disagree on whether ids are strings or numbers.
mod de {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }

    pub(super) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| D::Error::custom("file size must be a non-negative integer")),
            Some(Value::String(s)) => s.parse().map(Some).map_err(D::Error::custom),
            Some(other) => Err(D::Error::custom(format!("invalid file size: {other}"))),
        }
    }

    pub(super) mod id_string {
        use super::*;

        pub(crate) fn serialize<S>(id: &i64, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&id.to_string())
        }

        pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Value::deserialize(deserializer)? {
                Value::String(s) => s.trim().parse().map_err(D::Error::custom),
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| D::Error::custom("message id out of range")),
                other => Err(D::Error::custom(format!("invalid message id: {other}"))),
            }
        }
    }
}
