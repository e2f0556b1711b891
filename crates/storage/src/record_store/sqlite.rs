//! SQLite backend for the record store.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::backend::RecordStore;
use super::entry::{CacheKey, CacheRecord};

/// Errors opening the SQLite record store.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    /// SQLite database error.
    #[error("SQLite error: {0}")]
    Sqlite(String),
}

/// SQLite-based record store.
///
/// One row per `(id, v)` where `id` is `"<asset_space>:<path>"`, so records
/// of different versions of the same path coexist until swept. Uses WAL mode
/// for concurrent readers across processes.
pub struct SqliteRecordStore {
    /// Database connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    /// Table name (versioned for schema migrations).
    table_name: String,
}

impl SqliteRecordStore {
    /// Database schema version.
    const CACHE_DB_VERSION: u32 = 1;

    /// Create or open a SQLite record store at the given path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self, RecordStoreError> {
        let conn: Connection =
            Connection::open(db_path).map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;
        Self::init(conn, true)
    }

    /// Create a private in-memory store.
    pub fn open_in_memory() -> Result<Self, RecordStoreError> {
        let conn: Connection =
            Connection::open_in_memory().map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;
        Self::init(conn, false)
    }

    fn init(conn: Connection, wal: bool) -> Result<Self, RecordStoreError> {
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;
        }

        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;

        let table_name: String = format!("cache_records_v{}", Self::CACHE_DB_VERSION);

        let create_sql: String = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT NOT NULL,
                asset_space TEXT NOT NULL,
                v INTEGER NOT NULL,
                data BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (id, v)
            )",
            table_name
        );
        conn.execute(&create_sql, [])
            .map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;

        let index_sql: String = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_asset_space ON {}(asset_space, v)",
            table_name, table_name
        );
        conn.execute(&index_sql, [])
            .map_err(|e| RecordStoreError::Sqlite(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name,
        })
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheRecord> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            &format!(
                "SELECT data, v, created_at FROM {} WHERE id = ? AND v = ?",
                self.table_name
            ),
            params![key.record_id(), key.version as i64],
            |row| {
                let data: Vec<u8> = row.get(0)?;
                let version: i64 = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                Ok(CacheRecord::new(data, version as u64, created_at))
            },
        );

        match result {
            Ok(record) => Some(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                log::warn!("Record store get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, data: &[u8]) {
        let conn = self.conn.lock();

        let result = conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, asset_space, v, data, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                self.table_name
            ),
            params![
                key.record_id(),
                key.asset_space,
                key.version as i64,
                data,
                current_epoch_seconds()
            ],
        );

        if let Err(e) = result {
            log::warn!("Record store put error: {}", e);
        }
    }

    async fn delete(&self, key: &CacheKey) {
        let conn = self.conn.lock();
        let result = conn.execute(
            &format!("DELETE FROM {} WHERE id = ? AND v = ?", self.table_name),
            params![key.record_id(), key.version as i64],
        );
        if let Err(e) = result {
            log::warn!("Record store delete error: {}", e);
        }
    }

    async fn sweep_stale(&self, asset_space: &str, keep_version: u64) -> usize {
        let conn = self.conn.lock();
        let result = conn.execute(
            &format!(
                "DELETE FROM {} WHERE asset_space = ? AND v != ?",
                self.table_name
            ),
            params![asset_space, keep_version as i64],
        );
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                log::warn!("Record store sweep error: {}", e);
                0
            }
        }
    }

    async fn purge(&self, asset_space: &str) -> usize {
        let conn = self.conn.lock();
        let result = conn.execute(
            &format!("DELETE FROM {} WHERE asset_space = ?", self.table_name),
            params![asset_space],
        );
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                log::warn!("Record store purge error: {}", e);
                0
            }
        }
    }

    async fn count(&self) -> usize {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table_name),
            [],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(count) => count as usize,
            Err(e) => {
                log::warn!("Record store count error: {}", e);
                0
            }
        }
    }

    async fn clear(&self) {
        let conn = self.conn.lock();
        let result = conn.execute(&format!("DELETE FROM {}", self.table_name), []);
        if let Err(e) = result {
            log::warn!("Record store clear error: {}", e);
        }
    }
}

/// Get current time as epoch seconds.
fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_record_store_basic() {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::open(&dir.path().join("cache.db")).unwrap();

        let key = CacheKey::new("g", "b/c.txt", 1);
        assert!(store.get(&key).await.is_none());

        store.put(&key, b"XYZ").await;
        let record = store.get(&key).await.unwrap();
        assert_eq!(record.data, b"XYZ");
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_versions_coexist_and_do_not_alias() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        store.put(&CacheKey::new("g", "a.txt", 1), b"old").await;
        store.put(&CacheKey::new("g", "a.txt", 2), b"new").await;

        assert_eq!(store.count().await, 2);
        assert_eq!(
            store.get(&CacheKey::new("g", "a.txt", 2)).await.unwrap().data,
            b"new"
        );
        assert_eq!(
            store.get(&CacheKey::new("g", "a.txt", 1)).await.unwrap().data,
            b"old"
        );
        assert!(store.get(&CacheKey::new("g", "a.txt", 3)).await.is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_same_key() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let key = CacheKey::new("g", "a.txt", 1);
        store.put(&key, b"first").await;
        store.put(&key, b"second").await;
        assert_eq!(store.count().await, 1);
        assert_eq!(store.get(&key).await.unwrap().data, b"second");
    }

    #[tokio::test]
    async fn test_sweep_stale_only_touches_one_asset_space() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.put(&CacheKey::new("g", "a", 1), b"1").await;
        store.put(&CacheKey::new("g", "b", 1), b"1").await;
        store.put(&CacheKey::new("g", "a", 2), b"2").await;
        store.put(&CacheKey::new("other", "a", 1), b"1").await;

        assert_eq!(store.sweep_stale("g", 2).await, 2);
        assert_eq!(store.count().await, 2);
        assert!(store.get(&CacheKey::new("g", "a", 2)).await.is_some());
        assert!(store.get(&CacheKey::new("other", "a", 1)).await.is_some());
    }

    #[tokio::test]
    async fn test_purge_and_delete() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.put(&CacheKey::new("g", "a", 1), b"1").await;
        store.put(&CacheKey::new("g", "b", 1), b"1").await;
        store.put(&CacheKey::new("h", "a", 1), b"1").await;

        store.delete(&CacheKey::new("h", "a", 1)).await;
        assert_eq!(store.count().await, 2);
        assert_eq!(store.purge("g").await, 2);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_sqlite_record_store_persistence() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cache.db");
        let key = CacheKey::new("g", "index.html", 42);

        {
            let store = SqliteRecordStore::open(&db_path).unwrap();
            store.put(&key, b"<html>").await;
        }

        {
            let store = SqliteRecordStore::open(&db_path).unwrap();
            assert_eq!(store.get(&key).await.unwrap().data, b"<html>");
            store.clear().await;
            assert_eq!(store.count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_empty_record() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let key = CacheKey::new("g", "empty", 1);
        store.put(&key, b"").await;
        assert_eq!(store.get(&key).await.unwrap().data, Vec::<u8>::new());
    }
}
