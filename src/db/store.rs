//! Named storage slots backed by SQLite.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Key-value persistence for string blobs.
pub trait SlotStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Write `value` under `key`, replacing any previous blob.
    fn save(&self, key: &str, value: &str) -> Result<(), DbError>;
}

/// Thread-safe SQLite slot store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::with_connection(Connection::open(path)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }
}

impl SlotStore for Store {
    fn load(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        conn.execute(
            "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// In-process slot store.
#[derive(Default)]
pub struct MemorySlots {
    slots: Mutex<HashMap<String, String>>,
}

impl SlotStore for MemorySlots {
    fn load(&self, key: &str) -> Result<Option<String>, DbError> {
        let slots = self.slots.lock().map_err(|_| DbError::Poisoned)?;
        Ok(slots.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), DbError> {
        let mut slots = self.slots.lock().map_err(|_| DbError::Poisoned)?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_slot_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        assert_eq!(store.load("model").unwrap(), None);

        store.save("model", r#"{"configs":[]}"#).unwrap();
        assert_eq!(
            store.load("model").unwrap().as_deref(),
            Some(r#"{"configs":[]}"#)
        );

        // Overwrite
        store.save("model", "{}").unwrap();
        assert_eq!(store.load("model").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.load("other").unwrap(), None);
    }

    #[test]
    fn test_slots_survive_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = Store::new(tmp.path()).unwrap();
            store.save("model", "persisted").unwrap();
        }

        let reopened = Store::new(tmp.path()).unwrap();
        assert_eq!(reopened.load("model").unwrap().as_deref(), Some("persisted"));
    }

    #[test]
    fn test_memory_slots() {
        let slots = MemorySlots::default();
        assert_eq!(slots.load("k").unwrap(), None);
        slots.save("k", "v").unwrap();
        assert_eq!(slots.load("k").unwrap().as_deref(), Some("v"));
    }
}
