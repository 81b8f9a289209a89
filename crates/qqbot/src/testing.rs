//! Test doubles for the built-in apps.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use qqbot_core::{
    ArchiveResult, Bot, ChatScope, Envelope, MemoryArchive, Message, MessageArchive, Sender,
    TransportResult,
};

pub(crate) const SELF_ID: i64 = 10000;
pub(crate) const USER_ID: i64 = 20000;

/// A bot backed by an in-memory archive that records what it sends.
pub(crate) struct MockBot {
    archive: MemoryArchive,
    sent: Mutex<Vec<(ChatScope, Message)>>,
    next_id: AtomicI64,
}

impl MockBot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            archive: MemoryArchive::new(),
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(7000),
        })
    }

    pub fn sent(&self) -> Vec<(ChatScope, Message)> {
        self.sent.lock().clone()
    }

    fn record(&self, scope: ChatScope, message: Message) -> i64 {
        self.sent.lock().push((scope, message));
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Bot for MockBot {
    fn self_id(&self) -> i64 {
        SELF_ID
    }

    fn nickname(&self) -> &str {
        "mock"
    }

    async fn send_direct(&self, _user_id: i64, message: Message) -> TransportResult<i64> {
        Ok(self.record(ChatScope::Direct, message))
    }

    async fn send_group(&self, group_id: i64, message: Message) -> TransportResult<i64> {
        Ok(self.record(ChatScope::Group { group_id }, message))
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

pub(crate) fn envelope(message_id: i64, scope: ChatScope, message: Message) -> Envelope {
    Envelope {
        self_id: SELF_ID,
        time: 1700000000,
        message_id,
        sequence: message_id,
        scope,
        sender: Sender {
            user_id: USER_ID,
            nickname: "alice".into(),
            card: None,
        },
        message,
    }
}
