// src/storage/log.rs
//! Audit log: one persisted record per evaluated submission.
//!
//! Records are the input of retraining, so they keep everything needed to
//! rebuild the request a strategy saw: path, author, IP, headers and the
//! extracted content (base64 in storage).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Database;
use crate::error::{Result, SpamError};

const COLUMNS: &str =
    "id, time, path, author, authenticated, ipnr, headers, content, rejected, karma, reasons";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Assigned on insert; never reused.
    pub id: Option<i64>,
    pub time: DateTime<Utc>,
    pub path: String,
    pub author: String,
    pub authenticated: bool,
    pub ip: String,
    /// Newline-joined `Name: value` lines.
    pub headers: String,
    /// Decoded content.
    pub content: String,
    pub rejected: bool,
    pub karma: i32,
    /// Formatted reasons, `"{strategy} ({points}): {message}"`.
    pub reasons: Vec<String>,
}

impl LogEntry {
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let time: i64 = row.get(1)?;
        let content: String = row.get(7)?;
        let reasons: String = row.get(10)?;
        Ok(Self {
            id: Some(row.get(0)?),
            time: Utc.timestamp_opt(time, 0).single().unwrap_or_default(),
            path: row.get(2)?,
            author: row.get(3)?,
            authenticated: row.get::<_, i64>(4)? != 0,
            ip: row.get(5)?,
            headers: row.get(6)?,
            content: decode_content(&content),
            rejected: row.get::<_, i64>(8)? != 0,
            karma: row.get(9)?,
            reasons: if reasons.is_empty() {
                Vec::new()
            } else {
                reasons.split('\n').map(str::to_string).collect()
            },
        })
    }
}

/// Selection criteria for `AuditLog::select`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogFilter {
    pub ip: Option<String>,
}

/// UTF-8 text to its stored form (standard base64).
pub fn encode_content(content: &str) -> String {
    STANDARD.encode(content.as_bytes())
}

/// Inverse of `encode_content`. Rows written before encoding was introduced
/// hold raw text; those are returned as stored.
pub fn decode_content(stored: &str) -> String {
    let compact: String = stored.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| stored.to_string())
}

#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persists a new entry and assigns its id.
    pub fn insert(&self, entry: &mut LogEntry) -> Result<i64> {
        if entry.exists() {
            return Err(SpamError::EntryState("cannot insert existing log entry"));
        }
        let id = self.db.with_conn(|c| {
            c.execute(
                "INSERT INTO spamfilter_log
                 (time, path, author, authenticated, ipnr, headers, content, rejected, karma, reasons)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.time.timestamp(),
                    entry.path,
                    entry.author,
                    entry.authenticated as i64,
                    entry.ip,
                    entry.headers,
                    encode_content(&entry.content),
                    entry.rejected as i64,
                    entry.karma,
                    entry.reasons.join("\n"),
                ],
            )?;
            Ok(c.last_insert_rowid())
        })?;
        entry.id = Some(id);
        Ok(id)
    }

    pub fn update(&self, entry: &LogEntry) -> Result<()> {
        let id = entry
            .id
            .ok_or(SpamError::EntryState("cannot update a non-existing log entry"))?;
        let changed = self.db.with_conn(|c| {
            c.execute(
                "UPDATE spamfilter_log SET time = ?1, path = ?2, author = ?3, authenticated = ?4,
                 ipnr = ?5, headers = ?6, content = ?7, rejected = ?8, karma = ?9, reasons = ?10
                 WHERE id = ?11",
                params![
                    entry.time.timestamp(),
                    entry.path,
                    entry.author,
                    entry.authenticated as i64,
                    entry.ip,
                    entry.headers,
                    encode_content(&entry.content),
                    entry.rejected as i64,
                    entry.karma,
                    entry.reasons.join("\n"),
                    id,
                ],
            )
        })?;
        if changed == 0 {
            return Err(SpamError::LogEntryNotFound(id));
        }
        Ok(())
    }

    pub fn set_rejected(&self, id: i64, rejected: bool) -> Result<()> {
        let changed = self.db.with_conn(|c| {
            c.execute(
                "UPDATE spamfilter_log SET rejected = ?1 WHERE id = ?2",
                params![rejected as i64, id],
            )
        })?;
        if changed == 0 {
            return Err(SpamError::LogEntryNotFound(id));
        }
        Ok(())
    }

    pub fn fetch(&self, id: i64) -> Result<Option<LogEntry>> {
        self.db.with_conn(|c| {
            c.query_row(
                &format!("SELECT {COLUMNS} FROM spamfilter_log WHERE id = ?1"),
                params![id],
                LogEntry::from_row,
            )
            .optional()
        })
    }

    /// Newest first. `limit == 0` means no limit.
    pub fn select(&self, filter: &LogFilter, limit: usize, offset: usize) -> Result<Vec<LogEntry>> {
        let limit = if limit == 0 { -1 } else { i64::try_from(limit).unwrap_or(i64::MAX) };
        let offset = i64::try_from(offset).map_err(|_| SpamError::Config(format!("offset {offset} is out of range")))?;
        self.db.with_conn(|c| {
            let mut stmt = c.prepare(&format!(
                "SELECT {COLUMNS} FROM spamfilter_log
                 WHERE (?1 IS NULL OR ipnr = ?1)
                 ORDER BY time DESC, id DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(
                params![filter.ip.as_deref(), limit, offset],
                LogEntry::from_row,
            )?;
            rows.collect()
        })
    }

    /// Next older entry (nearest smaller id).
    pub fn next(&self, entry: &LogEntry) -> Result<Option<LogEntry>> {
        let Some(id) = entry.id else { return Ok(None) };
        self.db.with_conn(|c| {
            c.query_row(
                &format!("SELECT {COLUMNS} FROM spamfilter_log WHERE id < ?1 ORDER BY id DESC LIMIT 1"),
                params![id],
                LogEntry::from_row,
            )
            .optional()
        })
    }

    /// Next younger entry (nearest larger id).
    pub fn previous(&self, entry: &LogEntry) -> Result<Option<LogEntry>> {
        let Some(id) = entry.id else { return Ok(None) };
        self.db.with_conn(|c| {
            c.query_row(
                &format!("SELECT {COLUMNS} FROM spamfilter_log WHERE id > ?1 ORDER BY id ASC LIMIT 1"),
                params![id],
                LogEntry::from_row,
            )
            .optional()
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.count_matching(&LogFilter::default())
    }

    pub fn count_matching(&self, filter: &LogFilter) -> Result<u64> {
        self.db.with_conn(|c| {
            c.query_row(
                "SELECT COUNT(*) FROM spamfilter_log WHERE (?1 IS NULL OR ipnr = ?1)",
                params![filter.ip.as_deref()],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n.max(0) as u64)
    }

    /// Entries from `ip` logged at or after `since`.
    pub fn count_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64> {
        self.db
            .with_conn(|c| {
                c.query_row(
                    "SELECT COUNT(*) FROM spamfilter_log WHERE ipnr = ?1 AND time >= ?2",
                    params![ip, since.timestamp()],
                    |row| row.get::<_, i64>(0),
                )
            })
            .map(|n| n.max(0) as u64)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let n = self
            .db
            .with_conn(|c| c.execute("DELETE FROM spamfilter_log WHERE id = ?1", params![id]))?;
        Ok(n > 0)
    }

    /// Deletes entries older than `days` days.
    pub fn purge(&self, days: u32) -> Result<usize> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| SpamError::Config(format!("purge age of {days} days is out of range")))?;
        self.purge_before(cutoff)
    }

    /// Deletes entries with `time < cutoff`.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let n = self.db.with_conn(|c| {
            c.execute(
                "DELETE FROM spamfilter_log WHERE time < ?1",
                params![cutoff.timestamp()],
            )
        })?;
        if n > 0 {
            debug!(target: "storage", purged = n, cutoff = %cutoff, "audit log purged");
        }
        Ok(n)
    }
}
