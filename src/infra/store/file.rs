//! Append-only JSONL message store.
//!
//! Every create and update is appended as one line; opening the store
//! replays the log into memory. Writes hit the file before the in-memory
//! view changes, so a failed append leaves both unchanged.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{DispatchError, Message, MessageId, MessagePatch, MessageStatus, MessageStore};
use crate::util::clock::Clock;
use crate::util::jsonl;

use super::records::Records;

/// One line of the store log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StoreRecord {
    Created {
        message: Message,
    },
    Updated {
        id: MessageId,
        patch: MessagePatch,
        at: u128,
    },
    Discarded {
        ids: Vec<MessageId>,
    },
}

fn store_err(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Store(e.to_string())
}

/// Durable message store backed by an append-only log file.
pub struct FileMessageStore {
    path: PathBuf,
    records: RwLock<Records>,
    log: Mutex<File>,
    clock: Arc<dyn Clock>,
}

impl FileMessageStore {
    /// Open (or create) the store at `path`, replaying any existing log.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, DispatchError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(store_err)?;
        }

        let mut records = Records::default();
        let log_lines: Vec<StoreRecord> = jsonl::replay(&path).map_err(store_err)?;
        let replayed = log_lines.len();
        for line in log_lines {
            match line {
                StoreRecord::Created { message } => records.insert(message),
                StoreRecord::Updated { id, patch, at } => {
                    records.apply_unchecked(id, &patch, at);
                }
                StoreRecord::Discarded { ids } => records.remove(&ids),
            }
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(store_err)?;
        info!(path = %path.display(), replayed, "message store opened");

        Ok(Self {
            path,
            records: RwLock::new(records),
            log: Mutex::new(log),
            clock,
        })
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entries: &[StoreRecord]) -> Result<(), DispatchError> {
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry).map_err(store_err)?);
            buf.push('\n');
        }
        let mut log = self.log.lock();
        log.write_all(buf.as_bytes()).map_err(store_err)?;
        log.flush().map_err(store_err)
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn create_batch(&self, messages: &[Message]) -> Result<usize, DispatchError> {
        let mut records = self.records.write();
        records.check_new(messages)?;
        let entries: Vec<StoreRecord> = messages
            .iter()
            .map(|m| StoreRecord::Created { message: m.clone() })
            .collect();
        self.append(&entries)?;
        for message in messages {
            records.insert(message.clone());
        }
        Ok(messages.len())
    }

    async fn update(&self, id: MessageId, patch: MessagePatch) -> Result<Message, DispatchError> {
        let now = self.clock.now_ms();
        let mut records = self.records.write();
        let updated = records.patched(id, &patch, now)?;
        self.append(&[StoreRecord::Updated { id, patch, at: now }])?;
        records.insert(updated.clone());
        Ok(updated)
    }

    async fn toggle_starred(&self, id: MessageId) -> Result<Message, DispatchError> {
        let now = self.clock.now_ms();
        let mut records = self.records.write();
        let (patch, updated) = records.toggled(id, now)?;
        self.append(&[StoreRecord::Updated { id, patch, at: now }])?;
        records.insert(updated.clone());
        Ok(updated)
    }

    async fn discard(&self, ids: &[MessageId]) -> Result<usize, DispatchError> {
        let mut records = self.records.write();
        let doomed = records.discardable(ids);
        if doomed.is_empty() {
            return Ok(0);
        }
        self.append(&[StoreRecord::Discarded {
            ids: doomed.clone(),
        }])?;
        records.remove(&doomed);
        Ok(doomed.len())
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, DispatchError> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn query_by_sender(
        &self,
        sender_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DispatchError> {
        Ok(self.records.read().newest_for_sender(sender_id, limit))
    }

    async fn count_by_sender_and_statuses(
        &self,
        sender_id: &str,
        statuses: &[MessageStatus],
    ) -> Result<usize, DispatchError> {
        Ok(self.records.read().count_for_sender(sender_id, statuses))
    }

    async fn query_by_statuses(
        &self,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>, DispatchError> {
        Ok(self.records.read().oldest_with_statuses(statuses))
    }
}
