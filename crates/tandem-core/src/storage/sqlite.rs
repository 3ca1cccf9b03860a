//! `SQLite`-backed key/value store

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::{migrations, KeyValueStore};
use crate::error::Result;

/// Durable `KeyValueStore` on a single `SQLite` file.
///
/// Every write is committed before the call returns.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        configure(&conn);
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// WAL and relaxed fsync; in-memory databases reject some of these.
fn configure(conn: &Connection) {
    if let Err(error) = conn.pragma_update(None, "journal_mode", "WAL") {
        tracing::debug!("journal_mode=WAL not applied: {error}");
    }
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
}

impl KeyValueStore for SqliteKeyValueStore {
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM records
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let entries = stmt
            .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO records (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM records WHERE key = ?", params![key])?;
        Ok(())
    }

    fn data_version(&self) -> Result<u64> {
        let version: i64 =
            self.conn
                .lock()
                .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version.unsigned_abs())
    }
}
