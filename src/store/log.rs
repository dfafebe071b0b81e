//! Append-only record log with crash-safe replay.
//!
//! Records are written in JSON Lines format: one JSON object per line, each
//! carrying a monotonic sequence number, a timestamp and the caller's payload
//! flattened into the same object. Complete lines are always valid JSON, so a
//! partial final line left by a crash mid-write is detected on replay and
//! truncated away.
//!
//! The same log backs the store journal, the installation signal logs, the
//! repo event journal and the controller journal; each picks its own payload
//! type.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::marker::PhantomData;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::{fsync_dir, fsync_file};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// One line of the log.
///
/// ```json
/// {"seq":3,"ts":"2024-01-15T10:00:00Z","type":"webhook_received","event":{...}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord<T> {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: T,
}

/// An append-only log of `T` records. Every append is fsynced.
pub struct EventLog<T> {
    file: File,
    next_seq: u64,
    _records: PhantomData<fn(T)>,
}

impl<T> EventLog<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Opens (creating if needed) a log whose next record will be numbered 0.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with_seq(path, 0)
    }

    /// Opens a log for appending at a known sequence number.
    pub fn open_with_seq(path: impl AsRef<Path>, next_seq: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(EventLog {
            file,
            next_seq,
            _records: PhantomData,
        })
    }

    /// Replays the whole log, then opens it for appending after the last
    /// valid record.
    pub fn recover(path: impl AsRef<Path>) -> Result<(Self, Vec<LogRecord<T>>)> {
        let path = path.as_ref();
        let (records, next_seq) = Self::replay_from(path, 0)?;
        Ok((Self::open_with_seq(path, next_seq)?, records))
    }

    /// Appends `payload` as the next record. Durable when this returns.
    pub fn append(&mut self, payload: T) -> Result<LogRecord<T>> {
        let record = LogRecord {
            seq: self.next_seq,
            ts: Utc::now(),
            payload,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        fsync_file(&self.file)?;

        self.next_seq += 1;
        Ok(record)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Atomically replaces the log at `path` with `records`, renumbered from
    /// 0 with their timestamps kept, and opens it for appending.
    ///
    /// The new content is written to a sibling temp file and renamed over
    /// `path`, so a crash leaves either the old log or the new one.
    pub fn rewrite(path: impl AsRef<Path>, records: impl IntoIterator<Item = LogRecord<T>>) -> Result<Self> {
        let path = path.as_ref();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let mut next_seq = 0;
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            for record in records {
                let renumbered = LogRecord {
                    seq: next_seq,
                    ts: record.ts,
                    payload: record.payload,
                };
                let mut line = serde_json::to_vec(&renumbered)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
                next_seq += 1;
            }
            fsync_file(&tmp)?;
        }

        fs::rename(&tmp_path, path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fsync_dir(parent)?;
        }

        Ok(Self::open_with_seq(path, next_seq)?)
    }

    /// Reads the records stored from byte `offset` on.
    ///
    /// Returns the records and the sequence number the next append should
    /// use (0 for a missing or empty log). Reading stops at the first line
    /// that is unterminated, fails to parse or repeats a sequence number. The
    /// file is cut back to the end of the last good line, so what remains on
    /// disk is always a valid prefix.
    pub fn replay_from(path: impl AsRef<Path>, offset: u64) -> Result<(Vec<LogRecord<T>>, u64)> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };

        let start = usize::try_from(offset).map_or(bytes.len(), |o| o.min(bytes.len()));
        let mut records: Vec<LogRecord<T>> = Vec::new();
        let mut good_end = start;

        for line in bytes[start..].split_inclusive(|b| *b == b'\n') {
            // Every append ends in a newline; a line without one is torn even
            // if it happens to parse.
            if line.last() != Some(&b'\n') {
                break;
            }
            let text = line.trim_ascii();
            if !text.is_empty() {
                let Ok(record) = serde_json::from_slice::<LogRecord<T>>(text) else {
                    break;
                };
                if records.last().is_some_and(|prev| record.seq <= prev.seq) {
                    break;
                }
                records.push(record);
            }
            good_end += line.len();
        }

        if good_end < bytes.len() {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(good_end as u64)?;
            fsync_file(&file)?;
        }

        let next_seq = records.last().map_or(0, |r| r.seq + 1);
        Ok((records, next_seq))
    }
}
