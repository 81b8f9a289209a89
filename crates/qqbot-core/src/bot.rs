//! The bot facade.
//!
//! This module defines the [`Bot`] trait: the session-scoped identity of the
//! logged-in account plus the send/reply and archive primitives that the
//! dispatcher and handlers call into.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{ChatScope, Envelope};
use crate::error::{ArchiveResult, TransportResult};
use crate::message::Message;

/// The core Bot trait.
///
/// # API Design
///
/// - `send_direct` / `send_group`: address a message explicitly
/// - `reply`: answer an envelope in the conversation it came from
/// - `archive_message` / `lookup_archived_message`: the inbound message archive
///
/// Every send returns the gateway-assigned message id of the sent message,
/// which is what a later reply will point at.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// The bot's own QQ number.
    fn self_id(&self) -> i64;

    /// The bot's nickname.
    fn nickname(&self) -> &str;

    /// Sends a one-to-one message to `user_id`.
    async fn send_direct(&self, user_id: i64, message: Message) -> TransportResult<i64>;

    /// Sends a message to `group_id`.
    async fn send_group(&self, group_id: i64, message: Message) -> TransportResult<i64>;

    /// Sends `message` to the conversation `envelope` came from.
    async fn reply(&self, envelope: &Envelope, message: Message) -> TransportResult<i64> {
        match envelope.scope {
            ChatScope::Direct => self.send_direct(envelope.sender_id(), message).await,
            ChatScope::Group { group_id } => self.send_group(group_id, message).await,
        }
    }

    /// Stores an inbound envelope in the archive.
    async fn archive_message(&self, envelope: &Envelope) -> ArchiveResult<()>;

    /// Fetches an archived envelope by id, optionally filtered by group
    /// and sender.
    async fn lookup_archived_message(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope>;

    /// Returns self as an `Arc<dyn Any>` for downcasting to the concrete bot.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A boxed Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;
