//! Record persistence using SQLite.
//!
//! One table, keyed by `id`, with the remaining attributes stored as a JSON
//! object. The table name comes from configuration.

use super::{Record, RecordStore, StoreError};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Durable record store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE <table> (
///     id         TEXT PRIMARY KEY,
///     attributes TEXT NOT NULL,  -- JSON object
///     updated_at TEXT NOT NULL   -- ISO 8601 timestamp
/// );
/// ```
///
/// The connection is wrapped in a Mutex, so every operation (including the
/// read-merge-write of `update`) is atomic per key.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteRecordStore {
    /// Opens (or creates) the database and ensures the table exists.
    ///
    /// `db_path` may be `:memory:`.
    pub fn open<P: AsRef<Path>>(db_path: P, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            bail!("invalid table name '{}'", table);
        }

        let conn = Connection::open(db_path.as_ref()).with_context(|| {
            format!("Failed to open record DB at {}", db_path.as_ref().display())
        })?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id         TEXT PRIMARY KEY,
                attributes TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );"
        ))
        .with_context(|| format!("Failed to create table '{}'", table))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }
}

fn decode(id: String, raw: &str) -> Result<Record, StoreError> {
    let attributes: Map<String, Value> = serde_json::from_str(raw)?;
    Ok(Record::new(id, attributes))
}

impl RecordStore for SqliteRecordStore {
    fn put(&self, record: Record) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, attributes, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    attributes = excluded.attributes,
                    updated_at = excluded.updated_at",
                self.table
            ),
            params![record.id, attributes, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn insert_if_absent(&self, record: Record) -> Result<bool, StoreError> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} (id, attributes, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO NOTHING",
                self.table
            ),
            params![record.id, attributes, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT attributes FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| decode(id.to_string(), &raw)).transpose()
    }

    fn update(&self, id: &str, changes: Map<String, Value>) -> Result<Record, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let raw: Option<String> = tx
            .query_row(
                &format!("SELECT attributes FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let mut record = decode(id.to_string(), &raw)?;
        record.apply(changes);

        tx.execute(
            &format!(
                "UPDATE {} SET attributes = ?2, updated_at = ?3 WHERE id = ?1",
                self.table
            ),
            params![id, serde_json::to_string(&record.attributes)?, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )?;
        Ok(removed > 0)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are allowed.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
