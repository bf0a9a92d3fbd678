//! SQLite-backed blob store.
//!
//! One row per key. `rusqlite::Connection` is not `Sync` (it uses `RefCell`
//! internally), so the connection sits behind a `Mutex`; blob writes are small
//! and need exclusive access anyway.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use super::traits::BlobStore;
use crate::clock::now_ms;
use crate::error::{EnrichError, Result};

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        log::debug!("Opened blob store at {}", path.display());

        Ok(Self { db: Mutex::new(db) })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| EnrichError::Storage(e.to_string()))
    }
}

impl BlobStore for SqliteStore {
    fn persist(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, blob, now_ms() as i64],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blob = self
            .conn()?
            .query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(blob)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM blobs ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn()?.execute("DELETE FROM blobs", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("nested").join("cache.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_persist_and_load() {
        let (store, _temp) = create_test_store();
        store.persist("Acme", br#"{"key":"Acme"}"#).unwrap();

        assert_eq!(store.load("Acme").unwrap(), Some(br#"{"key":"Acme"}"#.to_vec()));
        assert_eq!(store.load("Missing").unwrap(), None);
    }

    #[test]
    fn test_persist_overwrites() {
        let (store, _temp) = create_test_store();
        store.persist("Acme", b"v1").unwrap();
        store.persist("Acme", b"v2").unwrap();

        assert_eq!(store.load("Acme").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.persist("Beta", b"blob").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load("Beta").unwrap(), Some(b"blob".to_vec()));
    }

    #[test]
    fn test_keys_remove_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.persist("b", b"2").unwrap();
        store.persist("a", b"1").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
