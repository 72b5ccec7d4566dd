//! Key-value persistence adapter for history snapshots and the credential.
//!
//! The store writes two keys: a serialized history snapshot and the API
//! credential. The adapter models the browser key-value collaborator as a
//! trait so the store can be built against SQLite, memory, or anything else
//! with last-writer-wins semantics.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::info;

/// Persistence failures. The store treats these as non-fatal: it logs and
/// continues with in-memory state for the session.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Minimal key-value contract: string keys, string values, last writer wins.
pub trait KeyValueAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory adapter for tests and for degraded (storage-fault) sessions.
#[derive(Default)]
pub struct MemoryAdapter {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueAdapter for MemoryAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }
}

/// SQLite-backed adapter. All operations are synchronous (rusqlite is
/// blocking); callers in async contexts should use `tokio::task::spawn_blocking`.
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
}

impl SqliteAdapter {
    /// Create or open the backing database.
    pub fn new(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Backend(format!("Failed to create data dir: {e}")))?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::Backend(format!("Failed to open database: {e}")))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| StorageError::Backend(format!("Failed to create kv table: {e}")))?;

        info!("Opened persistence database at {:?}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueAdapter for SqliteAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| StorageError::Backend(format!("Failed to prepare query: {e}")))?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Backend(format!("Failed to query key: {e}")))?;

        match rows.next() {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(StorageError::Backend(format!("Failed to read value: {e}"))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| StorageError::Backend(format!("Failed to write key: {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| StorageError::Backend(format!("Failed to delete key: {e}")))?;
        Ok(())
    }
}
