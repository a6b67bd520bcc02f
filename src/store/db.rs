//! Shared SQLite handle.
//!
//! A single connection behind a mutex is sufficient for this subsystem:
//! every operation is request/response and sub-millisecond, and SQLite's
//! row-level atomicity provides the guarantees the engine relies on.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

use super::schema;

/// Cloneable handle to the engine's SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::datastore_open(path.display().to_string(), e.to_string())
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::datastore_open(path.display().to_string(), e.to_string()))?;

        Self::from_connection(conn, busy_timeout_ms, Some(path))
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::datastore_open(":memory:", e.to_string()))?;
        Self::from_connection(conn, 0, None)
    }

    fn from_connection(
        conn: Connection,
        busy_timeout_ms: u64,
        path: Option<&Path>,
    ) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        if busy_timeout_ms > 0 {
            conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        }

        schema::migrate(&conn)?;

        if let Some(p) = path {
            info!(path = %p.display(), "Database ready");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a read-only closure against the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(Error::from)
    }

    /// Run a closure that may start a transaction.
    pub fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn).map_err(Error::from)
    }

    /// Round-trip a trivial query and measure its latency.
    ///
    /// This is the health monitor's liveness probe, not a correctness check.
    pub fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))?;
        Ok(start.elapsed())
    }
}

/// Current UTC timestamp in the RFC3339 form stored in every table.
pub(super) fn now_rfc3339() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_migrates() {
        let db = Database::open_in_memory().unwrap();
        // Seeded defaults prove the migration ran
        let count: i64 = db
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM parameters", [], |r| r.get(0)))
            .unwrap();
        assert!(count > 0);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("engine.db");
        let db = Database::open(&path, 1000).unwrap();
        assert!(path.exists());
        db.ping().unwrap();
    }

    #[test]
    fn test_ping_measures_latency() {
        let db = Database::open_in_memory().unwrap();
        let latency = db.ping().unwrap();
        assert!(latency < Duration::from_secs(1));
    }

    #[test]
    fn test_now_rfc3339_parses_back() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
