//! SQLite-backed snapshot store.

use crate::migration::run_migrations;
use crate::store::{ApplyFn, SnapshotStore};
use chrono::Utc;
use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Snapshot store backed by a single SQLite table.
///
/// Several stores, in one process or many, may open the same file.
/// [`SnapshotStore::update`] runs inside `BEGIN IMMEDIATE`, so concurrent
/// read-modify-write cycles on the file are serialized by SQLite itself.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn persistence(e: rusqlite::Error) -> PeerweaveError {
    PeerweaveError::Persistence(e.to_string())
}

fn read_value(conn: &Connection, key: &str) -> PeerweaveResult<Option<Vec<u8>>> {
    let result = conn.query_row(
        "SELECT value FROM snapshots WHERE key = ?1",
        rusqlite::params![key],
        |row| row.get::<_, Vec<u8>>(0),
    );
    match result {
        Ok(blob) => Ok(Some(blob)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(persistence(e)),
    }
}

fn write_value(conn: &Connection, key: &str, value: &[u8]) -> PeerweaveResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO snapshots (key, value, version, updated_at) VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(key) DO UPDATE SET value = ?2, version = version + 1, updated_at = ?3",
        rusqlite::params![key, value, now],
    )
    .map_err(persistence)?;
    Ok(())
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> PeerweaveResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(persistence)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(persistence)?;
        run_migrations(&conn).map_err(persistence)?;
        debug!(path = %path.display(), "Opened snapshot store");
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> PeerweaveResult<Self> {
        let conn = Connection::open_in_memory().map_err(persistence)?;
        run_migrations(&conn).map_err(persistence)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// Wrap an already-migrated connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of times `key` has been written, or `None` if absent.
    pub fn version(&self, key: &str) -> PeerweaveResult<Option<u64>> {
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT version FROM snapshots WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(v) => Ok(Some(v as u64)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(persistence(e)),
        }
    }
}

impl SnapshotStore for SqliteStore {
    fn put(&self, key: &str, value: &[u8]) -> PeerweaveResult<()> {
        write_value(&self.conn(), key, value)
    }

    fn get(&self, key: &str) -> PeerweaveResult<Option<Vec<u8>>> {
        read_value(&self.conn(), key)
    }

    fn delete(&self, key: &str) -> PeerweaveResult<()> {
        self.conn()
            .execute(
                "DELETE FROM snapshots WHERE key = ?1",
                rusqlite::params![key],
            )
            .map_err(persistence)?;
        Ok(())
    }

    fn keys(&self, prefix: &str) -> PeerweaveResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT key FROM snapshots WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )
            .map_err(persistence)?;
        let rows = stmt
            .query_map(rusqlite::params![prefix], |row| row.get::<_, String>(0))
            .map_err(persistence)?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(persistence)?);
        }
        Ok(keys)
    }

    fn update(&self, key: &str, apply: ApplyFn<'_>) -> PeerweaveResult<()> {
        let mut conn = self.conn();
        // Dropping the transaction without commit rolls it back.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(persistence)?;
        let current = read_value(&tx, key)?;
        if let Some(next) = apply(current)? {
            write_value(&tx, key, &next)?;
        }
        tx.commit().map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("peer/a").unwrap(), None);
        store.put("peer/a", b"snapshot").unwrap();
        assert_eq!(store.get("peer/a").unwrap().unwrap(), b"snapshot");
    }

    #[test]
    fn test_overwrite_bumps_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.version("k").unwrap(), None);
        store.put("k", b"1").unwrap();
        store.put("k", b"2").unwrap();
        assert_eq!(store.version("k").unwrap(), Some(2));
        assert_eq!(store.get("k").unwrap().unwrap(), b"2");
    }

    #[test]
    fn test_delete_and_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("peer/a", b"").unwrap();
        store.put("peer/b", b"").unwrap();
        store.put("peer_x", b"").unwrap();
        assert_eq!(store.keys("peer/").unwrap(), vec!["peer/a", "peer/b"]);

        store.delete("peer/a").unwrap();
        assert_eq!(store.keys("peer/").unwrap(), vec!["peer/b"]);
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("k", b"before").unwrap();
        let failing: ApplyFn<'_> = Box::new(|current| {
            assert_eq!(current.as_deref(), Some(&b"before"[..]));
            Err(PeerweaveError::NilVariable)
        });
        assert!(store.update("k", failing).is_err());
        assert_eq!(store.get("k").unwrap().unwrap(), b"before");
        assert_eq!(store.version("k").unwrap(), Some(1));

        let replace: ApplyFn<'_> = Box::new(|_| Ok(Some(b"after".to_vec())));
        store.update("k", replace).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"after");
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = Arc::clone(&store.conn);
        let _ = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            panic!("poison the connection lock");
        })
        .join();
        assert!(store.conn.is_poisoned());

        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("peerweave.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put("peer/local", b"persisted").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("peer/local").unwrap().unwrap(), b"persisted");
    }
}
