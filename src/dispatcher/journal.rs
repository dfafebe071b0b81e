//! Dispatcher journal with retention.
//!
//! Finished entries are only kept for deduplication, so once a key's
//! `Finished` entry is older than the dedupe window it is dropped, together
//! with the `Started` entry before it. A `Started` entry with no `Finished`
//! is a pending run and is always kept.
//!
//! Compaction rewrites the whole journal into a temporary file and renames
//! it over the old one, so a crash leaves either journal intact. It runs when
//! the file outgrows its threshold, and again on open if anything expired.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::store::{EventLog, LogError, LogRecord};
use crate::webhooks::DispatchKey;

use super::DispatchLogEntry;

type Result<T> = std::result::Result<T, LogError>;

/// Keeps the records still needed after `window` has passed since `now`.
pub fn retain_records(
    records: Vec<LogRecord<DispatchLogEntry>>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> Vec<LogRecord<DispatchLogEntry>> {
    let mut finished_at: HashMap<DispatchKey, DateTime<Utc>> = HashMap::new();
    for record in &records {
        if let DispatchLogEntry::Finished { key, .. } = &record.payload {
            finished_at.insert(key.clone(), record.ts);
        }
    }

    records
        .into_iter()
        .filter(|record| match &record.payload {
            DispatchLogEntry::Started { key, .. } => !finished_at.contains_key(key),
            DispatchLogEntry::Finished { key, .. } => {
                // Only the last outcome of a key counts.
                finished_at.get(key) == Some(&record.ts)
                    && record.ts.checked_add_signed(window).is_none_or(|expiry| expiry > now)
            }
        })
        .collect()
}

pub struct DispatchJournal {
    log: EventLog<DispatchLogEntry>,
    path: PathBuf,
    window: TimeDelta,
    threshold: u64,
    compact_at: u64,
}

impl DispatchJournal {
    /// Recovers the journal and drops expired entries. Returns the journal
    /// and the records that survived.
    pub fn open(
        path: impl Into<PathBuf>,
        window: TimeDelta,
        threshold: u64,
    ) -> Result<(Self, Vec<LogRecord<DispatchLogEntry>>)> {
        let path = path.into();
        let (log, records) = EventLog::<DispatchLogEntry>::recover(&path)?;
        let recovered = records.len();
        let retained = retain_records(records, Utc::now(), window);

        let log = if retained.len() < recovered {
            info!(
                journal = %path.display(),
                dropped = recovered - retained.len(),
                kept = retained.len(),
                "Dropped expired journal entries"
            );
            EventLog::rewrite(&path, retained.clone())?
        } else {
            log
        };

        let mut journal = DispatchJournal {
            log,
            path,
            window,
            threshold,
            compact_at: threshold,
        };
        journal.compact_at = journal.next_threshold()?;
        Ok((journal, retained))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry`, compacting first if the journal has outgrown its
    /// threshold. A failed compaction leaves the journal as it was.
    pub fn append(&mut self, entry: DispatchLogEntry) -> Result<()> {
        self.log.append(entry)?;
        if self.should_compact()?
            && let Err(e) = self.compact()
        {
            warn!(journal = %self.path.display(), error = %e, "Journal compaction failed");
            self.compact_at = self.compact_at.saturating_mul(2).max(1);
        }
        Ok(())
    }

    fn should_compact(&self) -> io::Result<bool> {
        Ok(fs::metadata(&self.path)?.len() >= self.compact_at)
    }

    /// Rewrites the journal without expired entries. Returns how many
    /// records were dropped.
    pub fn compact(&mut self) -> Result<usize> {
        let (records, _) = EventLog::<DispatchLogEntry>::replay_from(&self.path, 0)?;
        let before = records.len();
        let retained = retain_records(records, Utc::now(), self.window);
        let dropped = before - retained.len();

        self.log = EventLog::rewrite(&self.path, retained)?;
        self.compact_at = self.next_threshold()?;
        info!(
            journal = %self.path.display(),
            dropped,
            next_compaction_bytes = self.compact_at,
            "Compacted dispatcher journal"
        );
        Ok(dropped)
    }

    /// Twice the current size, so a journal full of live entries is not
    /// rewritten on every append.
    fn next_threshold(&self) -> io::Result<u64> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(self.threshold.max(size.saturating_mul(2)))
    }
}
