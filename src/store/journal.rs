//! Durable [`Store`]: an in-memory table set rebuilt from a JSON Lines journal.
//!
//! Every save is appended (and fsynced) to the journal before it becomes
//! visible in memory. Opening the store replays the journal; a torn final
//! line from a crash is truncated.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use super::log::EventLog;
use super::memory::MemoryStore;
use super::{Filter, Result, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Saved {
    table: String,
    key: String,
    row: Value,
}

pub struct JournalStore {
    rows: MemoryStore,
    journal: Mutex<EventLog<Saved>>,
}

impl JournalStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (journal, records) = EventLog::<Saved>::recover(path)?;

        let rows = MemoryStore::new();
        let replayed = records.len();
        for record in records {
            let Saved { table, key, row } = record.payload;
            rows.put(&table, &key, row).await;
        }

        info!(path = %path.display(), replayed, "Opened store journal");

        Ok(JournalStore {
            rows,
            journal: Mutex::new(journal),
        })
    }
}

#[async_trait]
impl Store for JournalStore {
    async fn get_raw(&self, table: &str, key: &str) -> Result<Option<Value>> {
        self.rows.get_raw(table, key).await
    }

    async fn save_raw(&self, table: &str, key: &str, row: Value) -> Result<()> {
        // Hold the journal lock across the memory write so replay order matches.
        let mut journal = self.journal.lock().await;
        journal.append(Saved {
            table: table.to_string(),
            key: key.to_string(),
            row: row.clone(),
        })?;
        self.rows.put(table, key, row).await;
        Ok(())
    }

    async fn filter_raw(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.rows.filter_raw(table, filter).await
    }
}
