//! Record store: durable key-value table for time slots and booking requests.
//!
//! Keyed by a single string `id`. Point operations only; each call is atomic
//! per key and there is no cross-key coordination.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::{is_valid_table_name, SqliteRecordStore};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored item: its key plus free-form attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Merges `changes` into the attributes; `null` removes an attribute.
    pub fn apply(&mut self, changes: Map<String, Value>) {
        for (name, value) in changes {
            if name == "id" {
                continue;
            }
            if value.is_null() {
                self.attributes.remove(&name);
            } else {
                self.attributes.insert(name, value);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record '{0}' not found")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode attributes: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value table.
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces the record with `record.id`.
    fn put(&self, record: Record) -> Result<(), StoreError>;

    /// Inserts the record only if no record has its key.
    ///
    /// Returns whether the record was written. An existing record is left
    /// untouched.
    fn insert_if_absent(&self, record: Record) -> Result<bool, StoreError>;

    /// Point lookup by key.
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Merges `changes` into an existing record.
    ///
    /// Returns `StoreError::NotFound` if no record has this key.
    fn update(&self, id: &str, changes: Map<String, Value>) -> Result<Record, StoreError>;

    /// Delete-if-exists. Returns whether a record was removed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
