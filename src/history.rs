//! Chat history storage and reporting.
//!
//! Conversation turns live in the `chat_messages` table of a SQLite file,
//! by default `data/database/chat_history.db` under the project root.
//! `ChatLog` appends turns; `ChatHistoryReader` opens the file read-only and
//! answers the inspection queries, one connection per query.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, Local, NaiveDateTime};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::HistoryError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chat_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id   TEXT NOT NULL,
    sender_name TEXT,
    message     TEXT,
    reply       TEXT,
    created_at  DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages(created_at);
CREATE INDEX IF NOT EXISTS idx_chat_messages_sender_id ON chat_messages(sender_id);
";

/// Storage format of `created_at`.
const STORED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const QUERY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Earliest time SQLite date functions understand.
const EARLIEST_QUERY_TIME: &str = "0000-01-01 00:00:00";

/// `<project_root>/data/database/chat_history.db`, project root being the
/// working directory.
pub fn default_db_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
        .join("database")
        .join("chat_history.db")
}

/// Append-only writer for chat turns.
pub struct ChatLog {
    conn: Connection,
}

impl ChatLog {
    /// Open or create the database, applying the schema.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("Chat log opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn record_turn(
        &self,
        sender_id: &str,
        sender_name: &str,
        message: &str,
        reply: &str,
    ) -> Result<i64, HistoryError> {
        self.record_turn_at(sender_id, sender_name, message, reply, Local::now().naive_local())
    }

    pub fn record_turn_at(
        &self,
        sender_id: &str,
        sender_name: &str,
        message: &str,
        reply: &str,
        created_at: NaiveDateTime,
    ) -> Result<i64, HistoryError> {
        self.conn.execute(
            "INSERT INTO chat_messages (sender_id, sender_name, message, reply, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sender_id,
                sender_name,
                message,
                reply,
                created_at.format(STORED_TIME_FORMAT).to_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentMessage {
    pub id: i64,
    pub sender_name: String,
    pub message: String,
    pub reply: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub message: String,
    pub reply: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveUser {
    pub sender_id: String,
    pub sender_name: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub sender_name: String,
    pub message: String,
    pub reply: String,
    pub created_at: String,
}

/// Nullable text column as a plain string.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

/// Escape LIKE wildcards so the keyword matches literally.
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// SQL `LIMIT` value; anything past `i64::MAX` is just "all rows".
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Log a failed query and degrade to an empty result.
fn or_empty<T>(result: Result<Vec<T>, HistoryError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        error!("Failed to {what}: {e}");
        Vec::new()
    })
}

/// Read-only queries over the chat log.
///
/// The `get_*` and `search_messages` methods log failures and return an empty
/// list, so "nothing found" and "query failed" look the same to the caller.
/// The typed variants (`recent_messages`, `user_history`, `daily_stats`,
/// `active_users`, `search`) return the error instead.
#[derive(Debug, Clone)]
pub struct ChatHistoryReader {
    db_path: PathBuf,
}

impl ChatHistoryReader {
    /// Fails with `HistoryError::NotFound` if the database file is missing.
    pub fn open(db_path: Option<&Path>) -> Result<Self, HistoryError> {
        let db_path = db_path.map(PathBuf::from).unwrap_or_else(default_db_path);
        if !db_path.exists() {
            return Err(HistoryError::NotFound(db_path));
        }
        info!("Reading chat history from {}", db_path.display());
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Fresh read-only connection, closed when dropped.
    fn connect(&self) -> Result<Connection, HistoryError> {
        Ok(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?)
    }

    pub fn recent_messages(&self, limit: usize) -> Result<Vec<RecentMessage>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, sender_name, message, reply, strftime('%Y-%m-%d %H:%M:%S', created_at)
             FROM chat_messages
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![sql_limit(limit)], |row| {
            Ok(RecentMessage {
                id: row.get(0)?,
                sender_name: text(row, 1)?,
                message: text(row, 2)?,
                reply: text(row, 3)?,
                created_at: text(row, 4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn user_history(&self, sender_id: &str) -> Result<Vec<UserMessage>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT message, reply, strftime('%Y-%m-%d %H:%M:%S', created_at)
             FROM chat_messages
             WHERE sender_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![sender_id], |row| {
            Ok(UserMessage {
                message: text(row, 0)?,
                reply: text(row, 1)?,
                created_at: text(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn daily_stats(&self, days: u32) -> Result<Vec<DailyCount>, HistoryError> {
        self.daily_stats_at(days, Local::now().naive_local())
    }

    /// Per-date message counts for rows at or after `now - days`.
    /// A window reaching before year 0 covers the whole table.
    pub fn daily_stats_at(
        &self,
        days: u32,
        now: NaiveDateTime,
    ) -> Result<Vec<DailyCount>, HistoryError> {
        let since = Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_sub_signed(window))
            .filter(|since| since.year() >= 0)
            .map(|since| since.format(QUERY_TIME_FORMAT).to_string())
            .unwrap_or_else(|| EARLIEST_QUERY_TIME.to_string());
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT date(created_at) AS day, COUNT(*)
             FROM chat_messages
             WHERE datetime(created_at) >= datetime(?1)
             GROUP BY day
             ORDER BY day",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok(DailyCount {
                date: text(row, 0)?,
                message_count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn active_users(&self, limit: usize) -> Result<Vec<ActiveUser>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT sender_id, MAX(sender_name), COUNT(*) AS message_count
             FROM chat_messages
             GROUP BY sender_id
             ORDER BY message_count DESC, sender_id
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![sql_limit(limit)], |row| {
            Ok(ActiveUser {
                sender_id: row.get(0)?,
                sender_name: text(row, 1)?,
                message_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Messages containing `keyword`. SQLite `LIKE` folds ASCII case only.
    pub fn search(&self, keyword: &str) -> Result<Vec<SearchHit>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT sender_name, message, reply, strftime('%Y-%m-%d %H:%M:%S', created_at)
             FROM chat_messages
             WHERE message LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![escape_like(keyword)], |row| {
            Ok(SearchHit {
                sender_name: text(row, 0)?,
                message: text(row, 1)?,
                reply: text(row, 2)?,
                created_at: text(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_recent_messages(&self, limit: usize) -> Vec<RecentMessage> {
        or_empty(self.recent_messages(limit), "load recent messages")
    }

    pub fn get_user_history(&self, sender_id: &str) -> Vec<UserMessage> {
        or_empty(self.user_history(sender_id), "load user history")
    }

    pub fn get_daily_stats(&self, days: u32) -> Vec<DailyCount> {
        or_empty(self.daily_stats(days), "load daily stats")
    }

    pub fn get_active_users(&self, limit: usize) -> Vec<ActiveUser> {
        or_empty(self.active_users(limit), "load active users")
    }

    pub fn search_messages(&self, keyword: &str) -> Vec<SearchHit> {
        or_empty(self.search(keyword), "search messages")
    }
}
