//! File-backed queue journal using JSON lines.
//!
//! Each mutation appends one [`JournalOp`] line. Compaction writes the live
//! entry set to a temporary file as `put` ops and renames it over the
//! journal, so a crash mid-compaction leaves the previous log in place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{QueueEntry, QueueError, RetryPolicy};
use crate::util::clock::Clock;
use crate::util::jsonl;

use super::memory::{DelayQueue, JournalOp, QueueJournal};

/// Durable queue: a [`DelayQueue`] journaled to a JSONL file.
pub type FileWorkQueue = DelayQueue<JsonlJournal>;

impl DelayQueue<JsonlJournal> {
    /// Open (or create) a queue journaled at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Result<Self, QueueError> {
        Self::with_journal(clock, policy, JsonlJournal::open(path)?)
    }
}

/// Append-only JSONL journal.
#[derive(Debug)]
pub struct JsonlJournal {
    path: PathBuf,
    log: Mutex<Option<File>>,
}

fn journal_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Journal(e.to_string())
}

impl JsonlJournal {
    /// Use `path` as the journal file, creating its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(journal_err)?;
        }
        Ok(Self {
            path,
            log: Mutex::new(None),
        })
    }

    /// Journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    fn open_append(&self) -> Result<File, QueueError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(journal_err)
    }
}

impl QueueJournal for JsonlJournal {
    fn load(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let ops: Vec<JournalOp> = jsonl::replay(&self.path).map_err(journal_err)?;
        Ok(JournalOp::replay(ops))
    }

    fn append(&self, ops: &[JournalOp]) -> Result<(), QueueError> {
        let mut buf = String::new();
        for op in ops {
            buf.push_str(&serde_json::to_string(op).map_err(journal_err)?);
            buf.push('\n');
        }
        let mut log = self.log.lock();
        if log.is_none() {
            *log = Some(self.open_append()?);
        }
        let Some(file) = log.as_mut() else {
            return Err(journal_err("journal file unavailable"));
        };
        if let Err(err) = file.write_all(buf.as_bytes()).and_then(|()| file.flush()) {
            *log = None;
            return Err(journal_err(err));
        }
        Ok(())
    }

    fn compact(&self, entries: &[&QueueEntry]) -> Result<(), QueueError> {
        let mut log = self.log.lock();
        let tmp = self.tmp_path();
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .map_err(journal_err)?;
            let mut writer = BufWriter::new(file);
            for entry in entries {
                let op = JournalOp::Put {
                    entry: (*entry).clone(),
                };
                let line = serde_json::to_string(&op).map_err(journal_err)?;
                writeln!(writer, "{line}").map_err(journal_err)?;
            }
            writer.flush().map_err(journal_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(journal_err)?;
        // The old handle points at the replaced file.
        *log = Some(self.open_append()?);
        Ok(())
    }
}
