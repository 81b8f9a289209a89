//! Message archival.
//!
//! Every inbound envelope is archived before dispatch so handlers can look
//! earlier messages up by id (for example the target of a reply). Records
//! keep a few indexed columns next to the serialized envelope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::envelope::Envelope;
use crate::error::{ArchiveError, ArchiveResult};

/// One archived message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRecord {
    /// Message id (primary key).
    pub message_id: i64,
    /// Message timestamp.
    pub time: i64,
    /// Group number, `None` for direct messages.
    pub group_id: Option<i64>,
    /// Sender QQ number.
    pub sender_id: i64,
    /// Output of [`Envelope::to_archivable`].
    pub payload: Vec<u8>,
}

impl ArchivedRecord {
    /// Builds a record from an envelope.
    pub fn from_envelope(envelope: &Envelope) -> ArchiveResult<Self> {
        Ok(Self {
            message_id: envelope.message_id,
            time: envelope.time,
            group_id: envelope.group_id(),
            sender_id: envelope.sender_id(),
            payload: envelope.to_archivable()?,
        })
    }

    /// Decodes the stored envelope.
    pub fn envelope(&self) -> ArchiveResult<Envelope> {
        Ok(Envelope::from_archivable(&self.payload)?)
    }

    /// Returns `true` if the record passes the optional filters.
    pub fn matches(&self, group: Option<i64>, sender: Option<i64>) -> bool {
        group.is_none_or(|g| self.group_id == Some(g))
            && sender.is_none_or(|s| self.sender_id == s)
    }
}

/// Storage for archived envelopes, keyed by message id.
#[async_trait]
pub trait MessageArchive: Send + Sync + 'static {
    /// Stores an envelope. An existing record with the same id is replaced.
    async fn archive(&self, envelope: &Envelope) -> ArchiveResult<()>;

    /// Fetches an envelope by id, optionally restricted to a group and/or
    /// sender. Fails with [`ArchiveError::NotFound`] when nothing matches.
    async fn fetch(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope>;

    /// Rewrites an existing record. Fails with [`ArchiveError::NotFound`] if
    /// the id was never archived.
    async fn update(&self, envelope: &Envelope) -> ArchiveResult<()>;
}

/// Shared archive.
pub type BoxedArchive = Arc<dyn MessageArchive>;

/// An archive that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: RwLock<HashMap<i64, ArchivedRecord>>,
}

impl MemoryArchive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived messages.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if nothing is archived.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns a copy of the raw record for `message_id`.
    pub fn record(&self, message_id: i64) -> Option<ArchivedRecord> {
        self.records.read().get(&message_id).cloned()
    }
}

#[async_trait]
impl MessageArchive for MemoryArchive {
    async fn archive(&self, envelope: &Envelope) -> ArchiveResult<()> {
        let record = ArchivedRecord::from_envelope(envelope)?;
        let replaced = self.records.write().insert(record.message_id, record);
        if replaced.is_some() {
            debug!(message_id = envelope.message_id, "Replaced archived message");
        } else {
            trace!(message_id = envelope.message_id, "Archived message");
        }
        Ok(())
    }

    async fn fetch(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope> {
        let record = self
            .records
            .read()
            .get(&message_id)
            .filter(|r| r.matches(group, sender))
            .cloned()
            .ok_or_else(|| ArchiveError::not_found(message_id))?;
        record.envelope()
    }

    async fn update(&self, envelope: &Envelope) -> ArchiveResult<()> {
        let record = ArchivedRecord::from_envelope(envelope)?;
        let mut records = self.records.write();
        match records.get_mut(&envelope.message_id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(ArchiveError::not_found(envelope.message_id)),
        }
    }
}
