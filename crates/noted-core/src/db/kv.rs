//! Durable key-value records backing the local note store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Database;
use crate::error::Result;
use crate::util::unix_millis_now;

/// Whole-value reads and writes keyed by a string.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys.
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// libSQL-backed implementation persisting to a local database file.
#[derive(Clone)]
pub struct LibSqlKeyValueStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LibSqlKeyValueStore {
    /// Open (or create) the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened local note store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

#[async_trait]
impl KeyValueStore for LibSqlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT value FROM kv WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get::<String>(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, ?)",
                libsql::params![key, value, unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM kv WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

/// Process-local implementation; contents are lost on drop.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        store.set("b", "3").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.remove_many(&["b", "c"]).await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn libsql_store_reads_back_writes() {
        let store = LibSqlKeyValueStore::open_in_memory().await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn memory_store_reads_back_writes() {
        exercise(&MemoryKeyValueStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn libsql_store_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("noted.db");

        {
            let store = LibSqlKeyValueStore::open_path(&db_path).await.unwrap();
            store.set("notes_offline", "[]").await.unwrap();
            assert_eq!(store.path(), Some(db_path.as_path()));
        }

        let reopened = LibSqlKeyValueStore::open_path(&db_path).await.unwrap();
        assert_eq!(
            reopened.get("notes_offline").await.unwrap().as_deref(),
            Some("[]")
        );
    }
}
