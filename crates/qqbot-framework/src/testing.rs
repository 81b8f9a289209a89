//! Test doubles shared by the framework's unit tests.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use qqbot_core::{
    ArchiveResult, Bot, BoxedBot, ChatScope, Envelope, MemoryArchive, Message, MessageArchive,
    Segment, Sender, TransportError, TransportResult,
};

use crate::context::DispatchContext;
use crate::pending::PendingStore;

pub(crate) const SELF_ID: i64 = 10000;
pub(crate) const USER_ID: i64 = 20000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Direct(i64),
    Group(i64),
}

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub target: Target,
    pub message: Message,
    pub message_id: i64,
}

/// A bot that records every send and hands out increasing message ids.
pub(crate) struct RecordingBot {
    next_id: AtomicI64,
    sent: Mutex<Vec<Sent>>,
    archive: MemoryArchive,
    offline: AtomicBool,
}

impl RecordingBot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(9000),
            sent: Mutex::new(Vec::new()),
            archive: MemoryArchive::new(),
            offline: AtomicBool::new(false),
        })
    }

    /// Makes every later send fail with a transport error.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    fn record(&self, target: Target, message: Message) -> TransportResult<i64> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                url: "http://gateway.test".into(),
                reason: "offline".into(),
            });
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(Sent {
            target,
            message,
            message_id,
        });
        Ok(message_id)
    }
}

#[async_trait]
impl Bot for RecordingBot {
    fn self_id(&self) -> i64 {
        SELF_ID
    }

    fn nickname(&self) -> &str {
        "test-bot"
    }

    async fn send_direct(&self, user_id: i64, message: Message) -> TransportResult<i64> {
        self.record(Target::Direct(user_id), message)
    }

    async fn send_group(&self, group_id: i64, message: Message) -> TransportResult<i64> {
        self.record(Target::Group(group_id), message)
    }

    async fn archive_message(&self, envelope: &Envelope) -> ArchiveResult<()> {
        self.archive.archive(envelope).await
    }

    async fn lookup_archived_message(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope> {
        self.archive.fetch(message_id, group, sender).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn envelope(message_id: i64, scope: ChatScope, message: Message) -> Envelope {
    Envelope {
        self_id: SELF_ID,
        time: 1700000000,
        message_id,
        sequence: message_id,
        scope,
        sender: Sender {
            user_id: USER_ID,
            nickname: "tester".into(),
            card: None,
        },
        message,
    }
}

pub(crate) fn direct_envelope(message_id: i64, text: &str) -> Envelope {
    envelope(message_id, ChatScope::Direct, Message::from_text(text))
}

pub(crate) fn group_envelope(
    message_id: i64,
    group_id: i64,
    text: &str,
    mention: bool,
) -> Envelope {
    let mut message = Message::new();
    if mention {
        message = message.segment(Segment::at(SELF_ID));
    }
    envelope(message_id, ChatScope::Group { group_id }, message.text(text))
}

/// A direct message replying to `target`.
pub(crate) fn direct_reply(message_id: i64, target: i64, text: &str) -> Envelope {
    envelope(
        message_id,
        ChatScope::Direct,
        Message::new().reply(target).text(text),
    )
}

pub(crate) fn context_for(envelope: Envelope, bot: Arc<RecordingBot>) -> Arc<DispatchContext> {
    let bot: BoxedBot = bot;
    Arc::new(DispatchContext::new(
        Arc::new(envelope),
        bot,
        Arc::new(PendingStore::new()),
        Uuid::new_v4(),
    ))
}
