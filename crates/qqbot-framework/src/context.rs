//! The context handed to handlers and continuations.
//!
//! One [`DispatchContext`] is created per inbound envelope. It carries the
//! envelope, the bot, the shared [`PendingStore`], a fresh response id used
//! to tag replies for traceability, and the [`MatchLabel`] that selected
//! the running handler.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use qqbot_core::{ArchiveResult, BoxedBot, Envelope, Message, TransportResult};

use crate::handler::MatchLabel;
use crate::pending::{CandidateData, PendingStore};

/// Per-dispatch context.
#[derive(Clone)]
pub struct DispatchContext {
    envelope: Arc<Envelope>,
    bot: BoxedBot,
    pending: Arc<PendingStore>,
    response_id: Uuid,
    label: Option<MatchLabel>,
}

impl DispatchContext {
    /// Creates a context for `envelope`.
    pub fn new(
        envelope: Arc<Envelope>,
        bot: BoxedBot,
        pending: Arc<PendingStore>,
        response_id: Uuid,
    ) -> Self {
        Self {
            envelope,
            bot,
            pending,
            response_id,
            label: None,
        }
    }

    /// A copy of this context carrying `label`.
    pub(crate) fn with_label(&self, label: MatchLabel) -> Arc<Self> {
        Arc::new(Self {
            label: Some(label),
            ..self.clone()
        })
    }

    /// A sibling context for another envelope, sharing bot, store and
    /// response id.
    pub(crate) fn for_envelope(&self, envelope: Arc<Envelope>) -> Self {
        Self {
            envelope,
            label: None,
            ..self.clone()
        }
    }

    /// The envelope being handled.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub(crate) fn envelope_arc(&self) -> &Arc<Envelope> {
        &self.envelope
    }

    /// The bot that received the envelope.
    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// The id tagging every reply of this dispatch.
    pub fn response_id(&self) -> Uuid {
        self.response_id
    }

    /// The label the handler's predicate returned, if any.
    pub fn label(&self) -> Option<&MatchLabel> {
        self.label.as_ref()
    }

    /// The shared pending-interaction store.
    pub fn pending(&self) -> &PendingStore {
        &self.pending
    }

    /// Replies in the conversation the envelope came from.
    ///
    /// Returns the message id of the sent reply.
    pub async fn reply(&self, message: impl Into<Message>) -> TransportResult<i64> {
        self.bot.reply(&self.envelope, message.into()).await
    }

    /// Replies, quoting the envelope being handled.
    pub async fn quote_reply(&self, message: impl Into<Message>) -> TransportResult<i64> {
        let message = message.into().reply(self.envelope.message_id);
        self.bot.reply(&self.envelope, message).await
    }

    /// Looks up an archived message through the bot.
    pub async fn lookup(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope> {
        self.bot
            .lookup_archived_message(message_id, group, sender)
            .await
    }

    /// Parks `continuation` until someone replies to `prompt_id`.
    ///
    /// `prompt_id` is normally the id returned by [`DispatchContext::reply`].
    /// `ttl` defaults to the store's default.
    pub fn await_reply<F, Fut>(
        &self,
        prompt_id: i64,
        data: impl Any + Send + Sync,
        ttl: Option<Duration>,
        continuation: F,
    ) where
        F: FnOnce(Arc<DispatchContext>, CandidateData) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.pending.register(prompt_id, data, ttl, continuation);
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("message_id", &self.envelope.message_id)
            .field("response_id", &self.response_id)
            .field("label", &self.label)
            .finish()
    }
}
