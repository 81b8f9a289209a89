//! File-backed message archive.
//!
//! [`FileArchive`] keeps one redb database per account. Each row of the
//! `messages` table is keyed by message id and holds the indexed columns
//! (time, group, sender) next to the archivable envelope JSON, so records
//! survive a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::archive::{ArchivedRecord, MessageArchive};
use crate::envelope::Envelope;
use crate::error::{ArchiveError, ArchiveResult};

const MESSAGES: TableDefinition<'static, i64, &'static [u8]> = TableDefinition::new("messages");

/// On-disk shape of one record.
#[derive(Serialize, Deserialize)]
struct Row {
    time: i64,
    group: Option<i64>,
    sender: i64,
    json: String,
}

impl Row {
    fn encode(record: &ArchivedRecord) -> ArchiveResult<Vec<u8>> {
        let json = String::from_utf8(record.payload.clone())
            .map_err(|e| ArchiveError::Serialization(e.to_string()))?;
        let row = Row {
            time: record.time,
            group: record.group_id,
            sender: record.sender_id,
            json,
        };
        serde_json::to_vec(&row).map_err(|e| ArchiveError::Serialization(e.to_string()))
    }

    fn decode(message_id: i64, bytes: &[u8]) -> ArchiveResult<ArchivedRecord> {
        let row: Row = serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::Serialization(e.to_string()))?;
        Ok(ArchivedRecord {
            message_id,
            time: row.time,
            group_id: row.group,
            sender_id: row.sender,
            payload: row.json.into_bytes(),
        })
    }
}

fn storage_error(err: impl Into<redb::Error>) -> ArchiveError {
    ArchiveError::Storage(err.into().to_string())
}

/// An archive stored in a redb database file.
#[derive(Clone)]
pub struct FileArchive {
    db: Arc<Database>,
    path: PathBuf,
}

impl FileArchive {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(storage_error)?;

        let write_txn = db.begin_write().map_err(storage_error)?;
        write_txn.open_table(MESSAGES).map_err(storage_error)?;
        write_txn.commit().map_err(storage_error)?;

        info!(path = %path.display(), "Message archive opened");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Opens `{dir}/{self_id}.redb`, creating `dir` if needed.
    pub fn for_account(dir: impl AsRef<Path>, self_id: i64) -> ArchiveResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| ArchiveError::Storage(e.to_string()))?;
        Self::open(dir.join(format!("{self_id}.redb")))
    }

    /// The database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of archived messages.
    pub fn len(&self) -> ArchiveResult<usize> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(MESSAGES).map_err(storage_error)?;
        Ok(table.len().map_err(storage_error)? as usize)
    }

    /// Returns `true` if nothing is archived.
    pub fn is_empty(&self) -> ArchiveResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the raw record for `message_id`.
    pub fn record(&self, message_id: i64) -> ArchiveResult<Option<ArchivedRecord>> {
        read_record(&self.db, message_id)
    }

    async fn blocking<T, F>(&self, op: F) -> ArchiveResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> ArchiveResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| ArchiveError::Storage(e.to_string()))?
    }
}

fn read_record(db: &Database, message_id: i64) -> ArchiveResult<Option<ArchivedRecord>> {
    let read_txn = db.begin_read().map_err(storage_error)?;
    let table = read_txn.open_table(MESSAGES).map_err(storage_error)?;
    let Some(value) = table.get(message_id).map_err(storage_error)? else {
        return Ok(None);
    };
    Row::decode(message_id, value.value()).map(Some)
}

/// Writes `bytes` under `message_id`. With `must_exist`, a missing id
/// fails with [`ArchiveError::NotFound`] and nothing is written.
fn write_row(
    db: &Database,
    message_id: i64,
    bytes: &[u8],
    must_exist: bool,
) -> ArchiveResult<bool> {
    let write_txn = db.begin_write().map_err(storage_error)?;
    let replaced = {
        let mut table = write_txn.open_table(MESSAGES).map_err(storage_error)?;
        if must_exist && table.get(message_id).map_err(storage_error)?.is_none() {
            return Err(ArchiveError::not_found(message_id));
        }
        table
            .insert(message_id, bytes)
            .map_err(storage_error)?
            .is_some()
    };
    write_txn.commit().map_err(storage_error)?;
    Ok(replaced)
}

#[async_trait]
impl MessageArchive for FileArchive {
    async fn archive(&self, envelope: &Envelope) -> ArchiveResult<()> {
        let record = ArchivedRecord::from_envelope(envelope)?;
        let bytes = Row::encode(&record)?;
        let message_id = record.message_id;

        let replaced = self
            .blocking(move |db| write_row(db, message_id, &bytes, false))
            .await?;
        if replaced {
            debug!(message_id, "Replaced archived message");
        } else {
            trace!(message_id, "Archived message");
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
            .blocking(move |db| read_record(db, message_id))
            .await?
            .filter(|r| r.matches(group, sender))
            .ok_or_else(|| ArchiveError::not_found(message_id))?;
        record.envelope()
    }

    async fn update(&self, envelope: &Envelope) -> ArchiveResult<()> {
        let record = ArchivedRecord::from_envelope(envelope)?;
        let bytes = Row::encode(&record)?;
        let message_id = record.message_id;

        self.blocking(move |db| write_row(db, message_id, &bytes, true))
            .await?;
        debug!(message_id, "Updated archived message");
        Ok(())
    }
}

impl std::fmt::Debug for FileArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileArchive")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ChatScope, Sender};
    use crate::message::Message;
    use tempfile::tempdir;

    fn envelope(message_id: i64, group: Option<i64>, sender: i64, message: Message) -> Envelope {
        Envelope {
            self_id: 10000,
            time: 1700000000 + message_id,
            message_id,
            sequence: message_id,
            scope: group.map_or(ChatScope::Direct, |group_id| ChatScope::Group { group_id }),
            sender: Sender {
                user_id: sender,
                nickname: "tester".into(),
                card: Some("名片".into()),
            },
            message,
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let original = envelope(
            100,
            Some(555),
            20000,
            Message::new().text("look ").face(14).text(" 你好"),
        );

        {
            let archive = FileArchive::for_account(dir.path(), 10000).unwrap();
            archive.archive(&original).await.unwrap();
        }

        let archive = FileArchive::for_account(dir.path(), 10000).unwrap();
        assert_eq!(archive.path(), dir.path().join("10000.redb"));
        assert_eq!(archive.len().unwrap(), 1);
        assert_eq!(archive.fetch(100, None, None).await.unwrap(), original);

        let record = archive.record(100).unwrap().unwrap();
        assert_eq!(record.group_id, Some(555));
        assert_eq!(record.sender_id, 20000);
        assert_eq!(record.time, 1700000100);
        assert_eq!(record.payload, original.to_archivable().unwrap());
    }

    #[tokio::test]
    async fn test_fetch_filters_and_missing() {
        let dir = tempdir().unwrap();
        let archive = FileArchive::open(dir.path().join("bot.redb")).unwrap();
        archive
            .archive(&envelope(7, Some(555), 2, Message::from_text("hi")))
            .await
            .unwrap();

        assert!(archive.fetch(7, Some(555), Some(2)).await.is_ok());
        assert!(archive.fetch(7, Some(556), None).await.unwrap_err().is_not_found());
        assert!(archive.fetch(7, None, Some(3)).await.unwrap_err().is_not_found());
        assert!(archive.fetch(8, None, None).await.unwrap_err().is_not_found());
        assert!(archive.record(8).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archive_replaces_and_update_requires_existing() {
        let dir = tempdir().unwrap();
        let archive = FileArchive::open(dir.path().join("bot.redb")).unwrap();
        assert!(archive.is_empty().unwrap());

        let missing = archive
            .update(&envelope(9, None, 1, Message::from_text("x")))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
        assert!(archive.is_empty().unwrap());

        archive
            .archive(&envelope(9, None, 1, Message::from_text("first")))
            .await
            .unwrap();
        archive
            .archive(&envelope(9, None, 1, Message::from_text("second")))
            .await
            .unwrap();
        archive
            .update(&envelope(9, None, 1, Message::from_text("after")))
            .await
            .unwrap();

        assert_eq!(archive.len().unwrap(), 1);
        let fetched = archive.fetch(9, None, None).await.unwrap();
        assert_eq!(fetched.plain_text(), "after");
    }

    #[test]
    fn test_accounts_use_separate_files() {
        let dir = tempdir().unwrap();
        let first = FileArchive::for_account(dir.path().join("databases"), 1).unwrap();
        let second = FileArchive::for_account(dir.path().join("databases"), 2).unwrap();
        assert_ne!(first.path(), second.path());
    }
}
