//! Key-value persistence for entities and events.
//!
//! The service only needs three operations from its database: fetch a row by
//! key, upsert a row, and list rows whose fields equal given values. [`Store`]
//! is that contract over JSON rows, and [`StoreExt`] adds typed access for
//! anything implementing [`Entity`].
//!
//! Each upsert is atomic for its single row. There are no cross-row
//! transactions; callers that need "create X unless it exists" coordinate
//! that themselves.

pub mod fsync;
pub mod journal;
pub mod log;
pub mod memory;

use std::future::Future;
use std::io;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use journal::JournalStore;
pub use log::{EventLog, LogError, LogRecord};
pub use memory::MemoryStore;

/// A persisted record type.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table the record lives in.
    const TABLE: &'static str;

    /// Primary key within the table.
    fn key(&self) -> String;
}

/// A conjunction of field equalities over serialized rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    /// Adds the clause `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.clauses.push((field.into(), value));
        self
    }

    /// Whether `row` satisfies every clause. An empty filter matches all rows.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| row.get(field) == Some(value))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("journal error: {0}")]
    Log(#[from] LogError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Row-level persistence over JSON values.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_raw(&self, table: &str, key: &str) -> Result<Option<Value>>;

    /// Inserts or replaces the row at `key`.
    async fn save_raw(&self, table: &str, key: &str, row: Value) -> Result<()>;

    /// Returns every row matching `filter`, in key order.
    async fn filter_raw(&self, table: &str, filter: &Filter) -> Result<Vec<Value>>;
}

/// Typed helpers over any [`Store`].
pub trait StoreExt: Store {
    fn get<E: Entity>(&self, key: &str) -> impl Future<Output = Result<Option<E>>> + Send {
        async move {
            match self.get_raw(E::TABLE, key).await? {
                Some(row) => Ok(Some(serde_json::from_value(row)?)),
                None => Ok(None),
            }
        }
    }

    fn save<E: Entity>(&self, entity: &E) -> impl Future<Output = Result<()>> + Send {
        async move {
            let row = serde_json::to_value(entity)?;
            self.save_raw(E::TABLE, &entity.key(), row).await
        }
    }

    fn filter<E: Entity>(&self, filter: &Filter) -> impl Future<Output = Result<Vec<E>>> + Send {
        async move {
            self.filter_raw(E::TABLE, filter)
                .await?
                .into_iter()
                .map(|row| serde_json::from_value(row).map_err(StoreError::from))
                .collect()
        }
    }

    /// First row matching `filter`, if any.
    fn find<E: Entity>(&self, filter: &Filter) -> impl Future<Output = Result<Option<E>>> + Send {
        async move { Ok(self.filter::<E>(filter).await?.into_iter().next()) }
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
