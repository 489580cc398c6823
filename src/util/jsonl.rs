//! JSON-lines log replay shared by the file-backed adapters.
//!
//! A crash in the middle of an append leaves a partial last line. Replay
//! drops that tail (and truncates the file back to the last complete record)
//! so the log stays appendable; a bad line anywhere else is corruption and
//! fails the replay.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Replay failure.
#[derive(Debug, Error)]
pub enum JsonlError {
    /// The file could not be read or repaired.
    #[error("log io error: {0}")]
    Io(#[from] io::Error),
    /// A record before the final line did not parse.
    #[error("corrupt record at line {line}: {source}")]
    Corrupt {
        /// 1-based line number.
        line: usize,
        /// Parse failure.
        source: serde_json::Error,
    },
}

/// Parse every record in `path`; a missing file replays as empty.
///
/// # Errors
///
/// [`JsonlError::Corrupt`] for an unparsable line that is followed by more
/// records, [`JsonlError::Io`] if the file cannot be read or truncated.
pub fn replay<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JsonlError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;

    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut line_no = 0usize;
    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(bytes.len(), |i| offset + i);
        let line = &bytes[offset..end];
        line_no += 1;

        if !line.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice(line) {
                Ok(record) => records.push(record),
                Err(source) => {
                    let rest_is_blank = bytes[end..].iter().all(u8::is_ascii_whitespace);
                    if !rest_is_blank {
                        return Err(JsonlError::Corrupt {
                            line: line_no,
                            source,
                        });
                    }
                    warn!(
                        path = %path.display(),
                        line = line_no,
                        error = %source,
                        "dropping torn record at end of log"
                    );
                    truncate(path, offset)?;
                    break;
                }
            }
        }
        offset = end + 1;
    }
    Ok(records)
}

fn truncate(path: &Path, len: usize) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len as u64)?;
    file.sync_all()
}
