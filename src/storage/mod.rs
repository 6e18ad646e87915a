// src/storage/mod.rs
//! SQLite persistence for the audit log and the classifier word table.
//!
//! One `Connection` behind a `parking_lot::Mutex`, shared through an `Arc`.
//! Calls are short and synchronous; writers are serialized by the lock.
//!
//! Schema versions (stored as `spamfilter_version` in `system`):
//! 1. `spamfilter_log`
//! 2. `headers` column on the log
//! 3. `spamfilter_bayes`

pub mod bayes;
pub mod log;

use std::{path::Path, sync::Arc};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

pub use bayes::ClassifierStore;
pub use log::{AuditLog, LogEntry, LogFilter};

pub const SCHEMA_VERSION: i64 = 3;

const MIGRATIONS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS spamfilter_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time INTEGER NOT NULL,
        path TEXT NOT NULL DEFAULT '',
        author TEXT NOT NULL DEFAULT '',
        authenticated INTEGER NOT NULL DEFAULT 0,
        ipnr TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        rejected INTEGER NOT NULL DEFAULT 0,
        karma INTEGER NOT NULL DEFAULT 0,
        reasons TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX IF NOT EXISTS idx_spamfilter_log_time ON spamfilter_log(time);
    CREATE INDEX IF NOT EXISTS idx_spamfilter_log_ipnr ON spamfilter_log(ipnr);",
    "ALTER TABLE spamfilter_log ADD COLUMN headers TEXT NOT NULL DEFAULT '';",
    "CREATE TABLE IF NOT EXISTS spamfilter_bayes (
        word TEXT PRIMARY KEY,
        nspam INTEGER NOT NULL DEFAULT 0,
        nham INTEGER NOT NULL DEFAULT 0
    );",
];

/// Shared database handle. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            // best effort; `Connection::open` reports the real failure
            let _ = std::fs::create_dir_all(dir);
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS system (name TEXT PRIMARY KEY, value TEXT);",
        )?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let current = read_version(&conn)?;
        if current >= SCHEMA_VERSION {
            return Ok(());
        }
        let tx = conn.transaction()?;
        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version > current {
                tx.execute_batch(sql)?;
            }
        }
        tx.execute(
            "INSERT INTO system (name, value) VALUES ('spamfilter_version', ?1)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION.to_string()],
        )?;
        tx.commit()?;
        info!(target: "storage", from = current, to = SCHEMA_VERSION, "spam filter schema upgraded");
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        read_version(&self.conn.lock())
    }

    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(self.clone())
    }

    pub fn classifier(&self) -> ClassifierStore {
        ClassifierStore::new(self.clone())
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        Ok(f(&mut conn)?)
    }
}

fn read_version(conn: &Connection) -> Result<i64> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM system WHERE name = 'spamfilter_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
}
