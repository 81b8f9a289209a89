//! Ordered segment sequences.
//!
//! [`Message`] is used both for inbound content (inside an [`Envelope`]) and
//! for outbound sends. It serializes as a plain JSON array of segments.
//!
//! ```rust,ignore
//! use qqbot_core::Message;
//!
//! let msg = Message::new()
//!     .reply(100)
//!     .text("Hello, ")
//!     .at(10001000);
//!
//! assert_eq!(msg.plain_text(), "Hello, ");
//! ```
//!
//! [`Envelope`]: crate::Envelope

use serde::{Deserialize, Deserializer, Serialize};

use crate::segment::Segment;

/// A message composed of multiple segments.
///
/// Builder methods keep at most one reply marker: [`Message::reply`] replaces
/// any existing marker and always places it first.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Message {
    segments: Vec<Segment>,
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Segment>::deserialize(deserializer).map(Message::from_segments)
    }
}

impl Message {
    /// Creates a new empty message.
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Creates a message from a vector of segments.
    ///
    /// Reply markers after the first one are dropped.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let mut seen_reply = false;
        let segments = segments
            .into_iter()
            .filter(|seg| {
                if seg.is_reply() {
                    if seen_reply {
                        return false;
                    }
                    seen_reply = true;
                }
                true
            })
            .collect();
        Self { segments }
    }

    /// Creates a message containing only plain text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::text(text)],
        }
    }

    // --------------------------------
    // Builder methods
    // --------------------------------

    /// Adds a text segment.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::text(text));
        self
    }

    /// Adds an @mention segment.
    pub fn at(mut self, qq: i64) -> Self {
        self.segments.push(Segment::at(qq));
        self
    }

    /// Adds a face segment.
    pub fn face(mut self, id: i32) -> Self {
        self.segments.push(Segment::face(id));
        self
    }

    /// Adds an image segment.
    pub fn image(mut self, file: impl Into<String>) -> Self {
        self.segments.push(Segment::image(file));
        self
    }

    /// Marks this message as a reply to `message_id`.
    pub fn reply(mut self, message_id: i64) -> Self {
        self.segments.retain(|seg| !seg.is_reply());
        self.segments.insert(0, Segment::reply(message_id));
        self
    }

    /// Adds an arbitrary segment.
    ///
    /// A reply marker is routed through [`Message::reply`].
    pub fn segment(mut self, segment: Segment) -> Self {
        if let Some(id) = segment.reply_target() {
            return self.reply(id);
        }
        self.segments.push(segment);
        self
    }

    // --------------------------------
    // Accessors
    // --------------------------------

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Iterates over the segments.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if there are no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenates all text segments.
    pub fn plain_text(&self) -> String {
        self.segments.iter().filter_map(Segment::as_text).collect()
    }

    /// Returns the id this message replies to, if any.
    pub fn reply_target(&self) -> Option<i64> {
        self.segments.iter().find_map(Segment::reply_target)
    }

    /// Returns `true` if any segment mentions `user_id`.
    pub fn mentions(&self, user_id: i64) -> bool {
        self.segments.iter().any(|seg| seg.is_mention_of(user_id))
    }

    /// Returns a copy without the reply marker.
    pub fn without_reply(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .filter(|seg| !seg.is_reply())
                .cloned()
                .collect(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self::from_segments(segments)
    }
}

impl IntoIterator for Message {
    type Item = Segment;
    type IntoIter = std::vec::IntoIter<Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}
