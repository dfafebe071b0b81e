//! In-process [`Store`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Filter, Result, Store};

/// Rows kept in memory, keyed by table then primary key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of rows in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Inserts a row without going through any journal. Used when replaying one.
    pub(crate) async fn put(&self, table: &str, key: &str, row: Value) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_raw(&self, table: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn save_raw(&self, table: &str, key: &str, row: Value) -> Result<()> {
        self.put(table, key, row).await;
        Ok(())
    }

    async fn filter_raw(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
